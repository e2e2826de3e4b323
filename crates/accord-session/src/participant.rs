//! The participant client.
//!
//! One background thread reads frames off the connection and feeds an
//! inbound queue; a caller-driven [`ParticipantClient::update`] drains the
//! outbound queue and processes whatever arrived. Single-producer /
//! single-consumer: the queues are the only shared state.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};

use accord_diff::{FileCommit, SyntaxCheck};
use accord_protocol::{split_into_chunks, SyncCodec, SyncMessage, PROTOCOL_VERSION};
use accord_store::{BackupStore, DirBackupStore};
use accord_types::{ParticipantId, Patch};

use crate::apply::{commit_all, rollback_all};
use crate::error::{SessionError, SessionResult};
use crate::transfer::encode_snapshot;
use crate::TreePatcher;

/// Things that happened during a [`ParticipantClient::update`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// Every participant confirmed; the session begins.
    SessionStarted,
    /// The merged patch applied cleanly to the local tree.
    PatchApplied { name: String },
    /// Local application failed (also reported to the coordinator).
    ApplyFailed { error: String },
    /// The coordinator aborted: some participants failed to apply.
    SyncFailed {
        reason: String,
        failed: Vec<ParticipantId>,
    },
    /// The coordinator aborted: merging failed.
    MergeFailed { reason: String },
}

/// One patch contributor connected to a coordinator.
pub struct ParticipantClient {
    id: ParticipantId,
    root: PathBuf,
    /// Snapshot store used to answer `SnapshotRequest`s. Optional: a
    /// participant without one simply cannot serve snapshots.
    store: Option<DirBackupStore>,
    check: Box<dyn SyntaxCheck>,
    stream: TcpStream,
    inbound: Receiver<SyncMessage>,
    outbound: VecDeque<SyncMessage>,
    /// Staged file replacements awaiting the session outcome. Committed on
    /// `GameStart`, rolled back on a sync failure.
    staged: Vec<FileCommit>,
    _reader: JoinHandle<()>,
}

impl ParticipantClient {
    /// Connect, introduce ourselves, and wait for the coordinator's ack.
    pub fn connect(
        addr: impl ToSocketAddrs,
        id: ParticipantId,
        root: impl Into<PathBuf>,
        store: Option<DirBackupStore>,
        check: Box<dyn SyntaxCheck>,
    ) -> SessionResult<Self> {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        write_frame(&mut stream, &SyncMessage::Hello {
            participant: id.clone(),
            version: PROTOCOL_VERSION,
        })?;

        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        match read_frame(&mut stream)? {
            SyncMessage::HelloAck { version } => {
                tracing::info!(participant = %id, version, "connected to coordinator");
            }
            other => {
                return Err(SessionError::UnexpectedMessage {
                    state: crate::session::SessionState::CollectingSelections,
                    what: format!("{} instead of hello ack", other.type_name()),
                })
            }
        }
        stream.set_read_timeout(None)?;

        let reader_stream = stream.try_clone()?;
        let (sender, inbound) = crossbeam_channel::unbounded();
        let reader = std::thread::spawn(move || reader_loop(reader_stream, sender));

        Ok(Self {
            id,
            root: root.into(),
            store,
            check,
            stream,
            inbound,
            outbound: VecDeque::new(),
            staged: Vec::new(),
            _reader: reader,
        })
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// Announce the patches this participant will contribute (may be none).
    pub fn select_patches(&mut self, patch_names: Vec<String>) {
        self.outbound
            .push_back(SyncMessage::PatchesSelection { patch_names });
    }

    /// Queue a patch upload in fixed-size chunks.
    pub fn upload_patch(&mut self, patch: &Patch) -> SessionResult<()> {
        let payload = patch.to_json()?.into_bytes();
        let chunks = split_into_chunks(&payload);
        let total = chunks.len() as u32;
        for (i, data) in chunks.into_iter().enumerate() {
            self.outbound.push_back(SyncMessage::PatchChunk {
                patch_name: patch.name.clone(),
                chunk_num: i as u32,
                total_chunks: total,
                data,
            });
        }
        Ok(())
    }

    /// Everything announced has been queued for upload.
    pub fn ready(&mut self) {
        self.outbound.push_back(SyncMessage::PatchesReady);
    }

    /// Drain the outbound queue, then handle everything that arrived.
    /// Returns the session-relevant events for the caller.
    pub fn update(&mut self) -> SessionResult<Vec<ClientEvent>> {
        while let Some(msg) = self.outbound.pop_front() {
            write_frame(&mut self.stream, &msg)?;
        }

        let mut events = Vec::new();
        loop {
            match self.inbound.try_recv() {
                Ok(msg) => self.handle(msg, &mut events)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(SessionError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "coordinator connection closed",
                    )))
                }
            }
        }
        Ok(events)
    }

    fn handle(&mut self, msg: SyncMessage, events: &mut Vec<ClientEvent>) -> SessionResult<()> {
        tracing::debug!(participant = %self.id, msg = msg.type_name(), "inbound");
        match msg {
            SyncMessage::PatchFile { filename, content, size } => {
                if content.len() as u64 != size {
                    tracing::warn!(filename = %filename, declared = size, actual = content.len(), "size field disagrees with payload");
                }
                // First acknowledgment phase: receipt.
                write_frame(&mut self.stream, &SyncMessage::PatchReceived)?;

                // Second phase: application. The `.bak` copies stay alive
                // until the coordinator announces the session outcome.
                match self.apply_merged(&content) {
                    Ok((name, staged)) => {
                        self.staged = staged;
                        write_frame(&mut self.stream, &SyncMessage::PatchApplied {
                            success: true,
                            error: None,
                        })?;
                        events.push(ClientEvent::PatchApplied { name });
                    }
                    Err(e) => {
                        let error = e.to_string();
                        tracing::warn!(participant = %self.id, error = %error, "merged patch failed to apply");
                        write_frame(&mut self.stream, &SyncMessage::PatchApplied {
                            success: false,
                            error: Some(error.clone()),
                        })?;
                        events.push(ClientEvent::ApplyFailed { error });
                    }
                }
            }
            SyncMessage::SnapshotRequest { snapshot } => self.serve_snapshot(&snapshot)?,
            SyncMessage::GameStart => {
                commit_all(std::mem::take(&mut self.staged))?;
                events.push(ClientEvent::SessionStarted);
            }
            SyncMessage::PatchSyncFailed { reason, failed_clients, .. } => {
                rollback_all(std::mem::take(&mut self.staged));
                events.push(ClientEvent::SyncFailed {
                    reason,
                    failed: failed_clients,
                });
            }
            SyncMessage::PatchMergeFailed { reason } => {
                rollback_all(std::mem::take(&mut self.staged));
                events.push(ClientEvent::MergeFailed { reason });
            }
            other => {
                tracing::warn!(msg = other.type_name(), "ignoring unexpected message");
            }
        }
        Ok(())
    }

    fn apply_merged(&self, content: &[u8]) -> SessionResult<(String, Vec<FileCommit>)> {
        let text = std::str::from_utf8(content).map_err(|e| {
            SessionError::Protocol(accord_protocol::ProtocolError::Deserialization(e.to_string()))
        })?;
        let patch = Patch::from_json(text)?;
        let patcher = TreePatcher::new(&self.root, self.check.as_ref());
        let staged = patcher.stage_patch(&patch)?;
        Ok((patch.name, staged))
    }

    fn serve_snapshot(&mut self, snapshot: &accord_types::SnapshotId) -> SessionResult<()> {
        let Some(store) = &self.store else {
            tracing::warn!(snapshot = %snapshot.short_hex(), "snapshot requested but no store attached");
            return Ok(());
        };
        let Some(path) = store.backup_path(snapshot)? else {
            tracing::warn!(snapshot = %snapshot.short_hex(), "snapshot requested but not held");
            return Ok(());
        };
        let payload = encode_snapshot(&path)?;
        let chunks = split_into_chunks(&payload);
        let total = chunks.len() as u32;
        tracing::info!(snapshot = %snapshot.short_hex(), chunks = total, "serving snapshot");
        for (i, data) in chunks.into_iter().enumerate() {
            write_frame(&mut self.stream, &SyncMessage::SnapshotChunk {
                snapshot: *snapshot,
                chunk_num: i as u32,
                total_chunks: total,
                data,
            })?;
        }
        Ok(())
    }
}

/// The background receive loop: read frames, push them onto the queue, exit
/// on close or error.
fn reader_loop(mut stream: TcpStream, sender: crossbeam_channel::Sender<SyncMessage>) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                while SyncCodec::has_complete_frame(&buffer) {
                    match SyncCodec::decode(&buffer) {
                        Ok((msg, consumed)) => {
                            buffer.drain(..consumed);
                            if sender.send(msg).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "undecodable frame; closing reader");
                            return;
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::debug!(error = %e, "reader loop ended");
                break;
            }
        }
    }
}

fn write_frame(stream: &mut TcpStream, msg: &SyncMessage) -> SessionResult<()> {
    let frame = SyncCodec::encode(msg)?;
    stream.write_all(&frame)?;
    Ok(())
}

/// Blocking framed read used only for the hello handshake.
fn read_frame(stream: &mut TcpStream) -> SessionResult<SyncMessage> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if SyncCodec::has_complete_frame(&buffer) {
            let (msg, _) = SyncCodec::decode(&buffer)?;
            return Ok(msg);
        }
        match stream.read(&mut chunk) {
            Ok(0) => {
                return Err(SessionError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed during handshake",
                )))
            }
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(SessionError::Io(e)),
        }
    }
}
