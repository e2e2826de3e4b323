//! The coordinator: one authoritative process driving the session state
//! machine over a set of participant connections.
//!
//! One non-blocking, timeout-based poll loop covers every connection; each
//! inbound message is handled synchronously inline. Protocol-state mutation
//! is single-threaded, so no locks — which also means merge and resolution
//! work block the loop for their duration. The protocol has no chunk
//! retransmission and no participant liveness timeout: a lost frame or a
//! silently crashed participant stalls the session (a detected disconnect
//! aborts it). The only timeout is the snapshot-fetch bound.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use accord_cache::ConflictCache;
use accord_diff::SyntaxCheck;
use accord_merge::{ConflictResolver, DirBase, MergePipeline};
use accord_protocol::{ChunkAssembler, SyncCodec, SyncMessage, PROTOCOL_VERSION};
use accord_store::{clear_tree, compute_directory_hash, copy_tree, BackupStore};
use accord_types::{ParticipantId, Patch, SnapshotId};

use crate::config::CoordinatorConfig;
use crate::error::{SessionError, SessionResult};
use crate::session::{Session, SessionState};
use crate::transfer::decode_snapshot_into;
use crate::TreePatcher;

/// How one session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Every participant confirmed application; the session may begin.
    Started {
        merged: Option<Patch>,
        new_base: Option<SnapshotId>,
    },
    /// The session was aborted and fully reset; a fresh attempt may start.
    Aborted {
        reason: String,
        failed: Vec<(ParticipantId, String)>,
    },
}

impl SessionOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

enum MergeStep {
    Distributed,
    NothingToMerge,
}

enum PollEvent {
    Message(ParticipantId, SyncMessage),
    Disconnected(ParticipantId),
}

struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl Connection {
    /// Drain whatever the socket has. Returns `false` once the peer closed.
    fn read_available(&mut self) -> std::io::Result<bool> {
        let mut chunk = [0u8; 8192];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Pop the next complete frame, if buffered.
    fn next_message(&mut self) -> SessionResult<Option<SyncMessage>> {
        if !SyncCodec::has_complete_frame(&self.buffer) {
            return Ok(None);
        }
        let (msg, consumed) = SyncCodec::decode(&self.buffer)?;
        self.buffer.drain(..consumed);
        Ok(Some(msg))
    }

    /// Write a full frame, spinning past `WouldBlock` on the non-blocking
    /// socket.
    fn write_message(&mut self, msg: &SyncMessage) -> SessionResult<()> {
        let frame = SyncCodec::encode(msg)?;
        let mut written = 0;
        while written < frame.len() {
            match self.stream.write(&frame[written..]) {
                Ok(0) => {
                    return Err(SessionError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "connection refused further bytes",
                    )))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(SessionError::Io(e)),
            }
        }
        Ok(())
    }
}

/// The authoritative session coordinator.
pub struct Coordinator {
    config: CoordinatorConfig,
    listener: TcpListener,
    connections: BTreeMap<ParticipantId, Connection>,
    /// Accepted sockets whose `Hello` has not arrived yet.
    pending: Vec<Connection>,
    store: Box<dyn BackupStore>,
    cache: ConflictCache,
    resolver: Box<dyn ConflictResolver>,
    check: Box<dyn SyntaxCheck>,
    assembler: ChunkAssembler,
    /// Pre-apply copy of the authoritative tree, alive until commit/abort.
    safety: Option<tempfile::TempDir>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Box<dyn BackupStore>,
        resolver: Box<dyn ConflictResolver>,
        check: Box<dyn SyntaxCheck>,
    ) -> SessionResult<Self> {
        let listener = TcpListener::bind(config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let cache = match &config.cache_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                ConflictCache::open(path)?
            }
            None => ConflictCache::in_memory(),
        };
        tracing::info!(addr = %listener.local_addr()?, "coordinator listening");
        Ok(Self {
            config,
            listener,
            connections: BTreeMap::new(),
            pending: Vec::new(),
            store,
            cache,
            resolver,
            check,
            assembler: ChunkAssembler::new(),
            safety: None,
        })
    }

    /// The actually bound address (relevant when configured with port 0).
    pub fn local_addr(&self) -> SessionResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn participant_count(&self) -> usize {
        self.connections.len()
    }

    /// Block until `count` participants have completed their `Hello`.
    pub fn wait_for_participants(
        &mut self,
        count: usize,
        timeout: Option<Duration>,
    ) -> SessionResult<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        while self.connections.len() < count {
            if let Some(deadline) = deadline {
                if Instant::now() > deadline {
                    return Err(SessionError::Config(format!(
                        "timed out waiting for {count} participants ({} connected)",
                        self.connections.len()
                    )));
                }
            }
            self.accept_pending()?;
            self.promote_pending()?;
            std::thread::sleep(self.config.poll_timeout());
        }
        Ok(())
    }

    /// Run one complete merge-and-distribute attempt over the currently
    /// connected participants. The `Session` lives and dies inside this
    /// call; a new attempt is a new call.
    pub fn run_session(&mut self) -> SessionResult<SessionOutcome> {
        let participants: Vec<ParticipantId> = self.connections.keys().cloned().collect();
        if participants.is_empty() {
            return Err(SessionError::Config("no participants connected".into()));
        }
        let mut session = Session::new(participants);
        tracing::info!(
            participants = self.connections.len(),
            "session collecting selections"
        );

        loop {
            if session.state() == SessionState::Merging {
                match self.merge_and_distribute(&mut session) {
                    Ok(MergeStep::Distributed) => {}
                    Ok(MergeStep::NothingToMerge) => {
                        self.broadcast(&SyncMessage::GameStart)?;
                        session.advance(SessionState::Started)?;
                        return Ok(SessionOutcome::Started {
                            merged: None,
                            new_base: None,
                        });
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        tracing::error!(error = %reason, "merge phase failed; aborting session");
                        self.restore_safety_backup()?;
                        self.broadcast(&SyncMessage::PatchMergeFailed {
                            reason: reason.clone(),
                        })?;
                        session.abort()?;
                        return Ok(SessionOutcome::Aborted {
                            reason,
                            failed: Vec::new(),
                        });
                    }
                }
            }

            if let Some(result) = session.applied_outcome() {
                return match result {
                    Ok(()) => {
                        let new_base = self.commit_tree()?;
                        self.broadcast(&SyncMessage::GameStart)?;
                        session.advance(SessionState::Started)?;
                        tracing::info!(new_base = %new_base.short_hex(), "session started");
                        Ok(SessionOutcome::Started {
                            merged: session.merged_patch().cloned(),
                            new_base: Some(new_base),
                        })
                    }
                    Err(failures) => {
                        self.restore_safety_backup()?;
                        let reason = "merged patch failed to apply on some participants".to_string();
                        let details = failures
                            .iter()
                            .map(|(p, m)| {
                                SessionError::RemoteApplyFailed {
                                    participant: p.clone(),
                                    message: m.clone(),
                                }
                                .to_string()
                            })
                            .collect();
                        self.broadcast(&SyncMessage::PatchSyncFailed {
                            reason: reason.clone(),
                            failed_clients: failures.iter().map(|(p, _)| p.clone()).collect(),
                            details,
                        })?;
                        session.abort()?;
                        tracing::warn!(failed = failures.len(), "session aborted");
                        Ok(SessionOutcome::Aborted { reason, failed: failures })
                    }
                };
            }

            for event in self.poll_once()? {
                match event {
                    PollEvent::Message(pid, msg) => {
                        if let Err(e) = self.dispatch(&mut session, &pid, msg) {
                            let reason = e.to_string();
                            tracing::error!(participant = %pid, error = %reason, "protocol error; aborting session");
                            self.restore_safety_backup()?;
                            self.broadcast(&SyncMessage::PatchSyncFailed {
                                reason: reason.clone(),
                                failed_clients: vec![pid.clone()],
                                details: vec![format!("{pid}: {reason}")],
                            })?;
                            session.abort()?;
                            return Ok(SessionOutcome::Aborted {
                                reason: reason.clone(),
                                failed: vec![(pid, reason)],
                            });
                        }
                    }
                    PollEvent::Disconnected(pid) => {
                        let reason = SessionError::Disconnected(pid.clone()).to_string();
                        self.restore_safety_backup()?;
                        self.broadcast(&SyncMessage::PatchSyncFailed {
                            reason: reason.clone(),
                            failed_clients: vec![pid.clone()],
                            details: vec![reason.clone()],
                        })?;
                        session.abort()?;
                        return Ok(SessionOutcome::Aborted {
                            reason: reason.clone(),
                            failed: vec![(pid, reason)],
                        });
                    }
                }
            }
        }
    }

    /// Validate bases, ensure the base snapshot is present, merge, apply
    /// locally (fail-fast), and fan the result out.
    fn merge_and_distribute(&mut self, session: &mut Session) -> SessionResult<MergeStep> {
        if session.contributed_patches().is_empty() {
            tracing::info!("no patches contributed; nothing to merge");
            return Ok(MergeStep::NothingToMerge);
        }

        // Base agreement comes before any merge work.
        let base = session.validate_bases()?;

        let base_path = match self.store.backup_path(&base)? {
            Some(path) => path,
            None => self.fetch_snapshot(session, &base)?,
        };

        let merged = {
            let base_src = DirBase::new(&base_path);
            let patches = session.contributed_patches();
            let mut pipeline = MergePipeline::new(&mut self.cache, self.resolver.as_ref());
            let merged = pipeline.run(&base_src, &patches)?;
            session.merge_attempts = pipeline.attempts_used() as u32;
            merged
        };

        // Apply to the authoritative copy first; distribution only happens
        // once the coordinator itself succeeded.
        self.safety = Some(self.take_safety_backup()?);
        let patcher = TreePatcher::new(&self.config.tree_root, self.check.as_ref());
        patcher.apply_patch(&merged)?;

        let content = merged.to_json()?.into_bytes();
        let message = SyncMessage::PatchFile {
            filename: format!("{}.patch", merged.name),
            size: content.len() as u64,
            content,
        };
        session.begin_distribution(merged)?;
        self.broadcast(&message)?;
        tracing::info!("merged patch distributed; awaiting receipt acks");
        Ok(MergeStep::Distributed)
    }

    /// Request the base snapshot from its owning participant and reassemble
    /// it, bounded by one overall timeout. The transfer is verified by
    /// recomputing its content hash; a mismatch discards it.
    fn fetch_snapshot(
        &mut self,
        session: &Session,
        id: &SnapshotId,
    ) -> SessionResult<PathBuf> {
        let owner = session
            .owner_of_base(id)
            .ok_or(SessionError::BaseBackupMissing(*id))?
            .clone();
        tracing::info!(snapshot = %id.short_hex(), owner = %owner, "fetching base snapshot");
        self.send_to(&owner, &SyncMessage::SnapshotRequest { snapshot: *id })?;

        let key = format!("snapshot:{}", id.to_hex());
        let deadline = Instant::now() + self.config.snapshot_fetch_timeout();

        loop {
            if Instant::now() > deadline {
                let _ = self.assembler.abort(&key);
                return Err(SessionError::SnapshotFetchTimeout {
                    seconds: self.config.snapshot_fetch_timeout_secs,
                });
            }
            for event in self.poll_once()? {
                let PollEvent::Message(pid, msg) = event else {
                    continue;
                };
                match msg {
                    SyncMessage::SnapshotChunk {
                        snapshot,
                        chunk_num,
                        total_chunks,
                        data,
                    } if snapshot == *id && pid == owner => {
                        let Some(payload) =
                            self.assembler.accept(&key, chunk_num, total_chunks, data)?
                        else {
                            continue;
                        };
                        let staging = tempfile::tempdir()?;
                        decode_snapshot_into(&payload, staging.path())?;
                        let actual = compute_directory_hash(staging.path())?;
                        if actual != *id {
                            return Err(SessionError::HashVerificationFailed {
                                expected: *id,
                                actual,
                            });
                        }
                        let (location, _) = self.store.create_backup(staging.path())?;
                        return Ok(location);
                    }
                    other => tracing::debug!(
                        from = %pid,
                        msg = other.type_name(),
                        "ignoring message during snapshot fetch"
                    ),
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        session: &mut Session,
        pid: &ParticipantId,
        msg: SyncMessage,
    ) -> SessionResult<()> {
        tracing::debug!(from = %pid, msg = msg.type_name(), "inbound");
        match msg {
            SyncMessage::PatchesSelection { patch_names } => {
                session.record_selection(pid, patch_names)
            }
            SyncMessage::PatchChunk {
                patch_name,
                chunk_num,
                total_chunks,
                data,
            } => {
                let key = format!("{pid}:{patch_name}");
                if let Some(payload) = self.assembler.accept(&key, chunk_num, total_chunks, data)? {
                    let text = String::from_utf8(payload).map_err(|e| {
                        SessionError::Protocol(accord_protocol::ProtocolError::Deserialization(
                            e.to_string(),
                        ))
                    })?;
                    let patch = Patch::from_json(&text)?;
                    session.accept_patch(pid, patch)?;
                }
                Ok(())
            }
            SyncMessage::PatchesReady => session.record_ready(pid),
            SyncMessage::PatchReceived => session.record_received(pid),
            SyncMessage::PatchApplied { success, error } => {
                let result = if success {
                    Ok(())
                } else {
                    Err(error.unwrap_or_else(|| "no error message".into()))
                };
                session.record_applied(pid, result)
            }
            other => {
                tracing::warn!(from = %pid, msg = other.type_name(), "ignoring unexpected message");
                Ok(())
            }
        }
    }

    /// One pass of the poll loop: accept newcomers, promote completed
    /// hellos, and drain every connection. Sleeps the poll timeout when
    /// nothing happened.
    fn poll_once(&mut self) -> SessionResult<Vec<PollEvent>> {
        self.accept_pending()?;
        self.promote_pending()?;

        let mut events = Vec::new();
        let mut dropped = Vec::new();
        for (pid, connection) in &mut self.connections {
            match connection.read_available() {
                Ok(true) => {}
                Ok(false) => {
                    dropped.push(pid.clone());
                    continue;
                }
                Err(e) => {
                    tracing::warn!(participant = %pid, error = %e, "read failed");
                    dropped.push(pid.clone());
                    continue;
                }
            }
            while let Some(msg) = connection.next_message()? {
                events.push(PollEvent::Message(pid.clone(), msg));
            }
        }
        for pid in dropped {
            self.connections.remove(&pid);
            tracing::warn!(participant = %pid, "participant disconnected");
            events.push(PollEvent::Disconnected(pid));
        }

        if events.is_empty() {
            std::thread::sleep(self.config.poll_timeout());
        }
        Ok(events)
    }

    fn accept_pending(&mut self) -> SessionResult<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(true)?;
                    tracing::debug!(%addr, "connection accepted; awaiting hello");
                    self.pending.push(Connection {
                        stream,
                        buffer: Vec::new(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(SessionError::Io(e)),
            }
        }
    }

    fn promote_pending(&mut self) -> SessionResult<()> {
        let mut still_pending = Vec::new();
        for mut connection in std::mem::take(&mut self.pending) {
            match connection.read_available() {
                Ok(true) => {}
                _ => continue, // closed before hello
            }
            match connection.next_message()? {
                Some(SyncMessage::Hello { participant, version }) => {
                    tracing::info!(participant = %participant, version, "participant joined");
                    connection.write_message(&SyncMessage::HelloAck {
                        version: PROTOCOL_VERSION,
                    })?;
                    self.connections.insert(participant, connection);
                }
                Some(other) => {
                    tracing::warn!(msg = other.type_name(), "expected hello; dropping connection");
                }
                None => still_pending.push(connection),
            }
        }
        self.pending = still_pending;
        Ok(())
    }

    fn broadcast(&mut self, msg: &SyncMessage) -> SessionResult<()> {
        tracing::debug!(msg = msg.type_name(), "broadcast");
        for connection in self.connections.values_mut() {
            connection.write_message(msg)?;
        }
        Ok(())
    }

    fn send_to(&mut self, pid: &ParticipantId, msg: &SyncMessage) -> SessionResult<()> {
        let connection = self
            .connections
            .get_mut(pid)
            .ok_or_else(|| SessionError::UnknownParticipant(pid.clone()))?;
        connection.write_message(msg)
    }

    /// Copy the authoritative tree aside before applying a merged patch.
    fn take_safety_backup(&self) -> SessionResult<tempfile::TempDir> {
        let staging = tempfile::tempdir()?;
        copy_tree(&self.config.tree_root, staging.path())?;
        Ok(staging)
    }

    /// Abort path: put the pre-apply tree back and drop the safety copy.
    fn restore_safety_backup(&mut self) -> SessionResult<()> {
        if let Some(safety) = self.safety.take() {
            tracing::warn!("restoring authoritative tree from safety backup");
            clear_tree(&self.config.tree_root)?;
            copy_tree(safety.path(), &self.config.tree_root)?;
        }
        Ok(())
    }

    /// Commit path: drop the safety copy and snapshot the new tree as the
    /// next session's base.
    fn commit_tree(&mut self) -> SessionResult<SnapshotId> {
        self.safety = None;
        let (_, id) = self.store.create_backup(&self.config.tree_root)?;
        Ok(id)
    }
}
