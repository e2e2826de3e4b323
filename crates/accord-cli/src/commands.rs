use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use colored::Colorize;

use accord_diff::{apply_with, ApplyOptions, BalancedDelimiters, FileCommit, NoCheck, SyntaxCheck};
use accord_merge::{merge_lines, NoResolver};
use accord_session::{
    ClientEvent, Coordinator, CoordinatorConfig, ParticipantClient, SessionOutcome,
};
use accord_store::{compute_directory_hash, is_junk, BackupStore, DirBackupStore};
use accord_types::{FileChange, ParticipantId, Patch, PatchMetadata};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Diff(args) => cmd_diff(args),
        Command::Apply(args) => cmd_apply(args),
        Command::Merge(args) => cmd_merge(args),
        Command::Hash(args) => cmd_hash(args),
        Command::Patch(args) => cmd_patch(args),
        Command::Snapshot(args) => cmd_snapshot(args),
        Command::Serve(args) => cmd_serve(args),
        Command::Join(args) => cmd_join(args),
    }
}

fn read_file(path: &str) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {path}"))
}

fn cmd_diff(args: DiffArgs) -> anyhow::Result<()> {
    let old = read_file(&args.old)?;
    let new = read_file(&args.new)?;
    print!("{}", accord_diff::diff(&old, &new));
    Ok(())
}

fn cmd_apply(args: ApplyArgs) -> anyhow::Result<()> {
    let original = read_file(&args.file)?;
    let diff_text = read_file(&args.patch)?;

    let options = ApplyOptions {
        repair_smashed: args.repair,
    };
    let applied = apply_with(&original, &diff_text, options)
        .with_context(|| format!("applying {} to {}", args.patch, args.file))?;

    let check: Box<dyn SyntaxCheck> = if args.check_syntax {
        Box::new(BalancedDelimiters)
    } else {
        Box::new(NoCheck)
    };
    let commit = FileCommit::write(Path::new(&args.file), &applied.text, check.as_ref())?;
    commit.commit()?;

    println!(
        "{} Patched {} ({} hunk{} applied)",
        "✓".green().bold(),
        args.file.bold(),
        applied.modified_ranges.len(),
        if applied.modified_ranges.len() == 1 { "" } else { "s" },
    );
    Ok(())
}

fn cmd_merge(args: MergeArgs) -> anyhow::Result<()> {
    let base = read_file(&args.base)?;
    let ours = read_file(&args.ours)?;
    let theirs = read_file(&args.theirs)?;

    let merged = merge_lines(&base, &ours, &theirs);
    print!("{}", merged.text);
    if merged.has_conflicts() {
        eprintln!(
            "{} {} conflict region{} left in output",
            "!".yellow().bold(),
            merged.conflicts,
            if merged.conflicts == 1 { "" } else { "s" },
        );
    }
    Ok(())
}

fn cmd_hash(args: HashArgs) -> anyhow::Result<()> {
    let id = compute_directory_hash(Path::new(&args.dir))?;
    println!("{id}");
    Ok(())
}

fn cmd_patch(args: PatchArgs) -> anyhow::Result<()> {
    let base_root = Path::new(&args.base);
    let work_root = Path::new(&args.work);
    let base_id = compute_directory_hash(base_root)?;

    // Union of non-junk file paths across both trees, in sorted order.
    let mut paths = std::collections::BTreeSet::new();
    for root in [base_root, work_root] {
        for entry in walkdir::WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(root)?;
            if is_junk(rel) {
                continue;
            }
            paths.insert(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    let mut changes = Vec::new();
    let mut metadata = PatchMetadata::new(args.name.clone());
    for rel in &paths {
        let before = std::fs::read_to_string(base_root.join(rel)).unwrap_or_default();
        let after = std::fs::read_to_string(work_root.join(rel)).unwrap_or_default();
        if before == after {
            continue;
        }
        changes.push(FileChange::new(rel.clone(), accord_diff::diff(&before, &after)));
        metadata.record(rel.clone(), &before, &after);
    }

    if changes.is_empty() {
        println!("No changes between {} and {}.", args.base, args.work);
        return Ok(());
    }

    let file_count = changes.len();
    let patch = Patch::new(args.name.clone(), base_id, changes);
    let out = args.out.unwrap_or_else(|| format!("{}.patch.json", args.name));
    std::fs::write(&out, patch.to_json()?)?;
    println!(
        "{} Wrote {} ({} file{}, base {})",
        "✓".green().bold(),
        out.bold(),
        file_count,
        if file_count == 1 { "" } else { "s" },
        base_id.short_hex().yellow(),
    );

    if args.metadata {
        let meta_out = format!("{}.meta.json", args.name);
        std::fs::write(&meta_out, serde_json::to_string_pretty(&metadata)?)?;
        println!("  metadata sidecar: {meta_out}");
    }
    Ok(())
}

fn cmd_snapshot(args: SnapshotArgs) -> anyhow::Result<()> {
    let store = DirBackupStore::open(&args.store)?;
    let (location, id) = store.create_backup(Path::new(&args.dir))?;
    println!("{} Snapshot {}", "✓".green().bold(), id.short_hex().yellow());
    println!("  id: {id}");
    println!("  location: {}", location.display());
    Ok(())
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => CoordinatorConfig::from_toml_file(Path::new(path))?,
        None => CoordinatorConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.parse().context("parsing --bind")?;
    }
    if let Some(root) = &args.root {
        config.tree_root = PathBuf::from(root);
    }

    let store = DirBackupStore::open(&config.backup_root)?;
    let check: Box<dyn SyntaxCheck> = if args.check_syntax {
        Box::new(BalancedDelimiters)
    } else {
        Box::new(NoCheck)
    };
    let mut coordinator =
        Coordinator::new(config, Box::new(store), Box::new(NoResolver), check)?;

    println!(
        "Coordinator on {} — waiting for {} participant{}",
        coordinator.local_addr()?.to_string().bold(),
        args.participants,
        if args.participants == 1 { "" } else { "s" },
    );
    coordinator.wait_for_participants(args.participants, None)?;

    loop {
        match coordinator.run_session()? {
            SessionOutcome::Started { new_base, .. } => {
                println!("{} Session started.", "✓".green().bold());
                if let Some(base) = new_base {
                    println!("  new base: {}", base.short_hex().yellow());
                }
                return Ok(());
            }
            SessionOutcome::Aborted { reason, failed } => {
                println!("{} Session aborted: {}", "✗".red().bold(), reason);
                for (participant, message) in &failed {
                    println!("  {}: {}", participant.to_string().yellow(), message);
                }
                println!("Restarting collection...");
            }
        }
    }
}

fn cmd_join(args: JoinArgs) -> anyhow::Result<()> {
    let store = match &args.store {
        Some(root) => Some(DirBackupStore::open(root)?),
        None => None,
    };
    let id = ParticipantId::new(args.name.clone())?;
    let mut client = ParticipantClient::connect(
        args.addr.as_str(),
        id,
        &args.root,
        store,
        Box::new(NoCheck),
    )?;
    println!("Joined coordinator at {}", args.addr.bold());

    let mut names = Vec::new();
    let mut patches = Vec::new();
    for path in &args.patches {
        let patch = Patch::from_json(&read_file(path)?)?;
        names.push(patch.name.clone());
        patches.push(patch);
    }
    client.select_patches(names);
    for patch in &patches {
        client.upload_patch(patch)?;
        println!("  {} {}", "uploaded:".green(), patch.name);
    }
    client.ready();

    // Pump until the session reaches a terminal broadcast.
    let deadline = Instant::now() + Duration::from_secs(600);
    while Instant::now() < deadline {
        for event in client.update()? {
            match event {
                ClientEvent::SessionStarted => {
                    println!("{} Session started.", "✓".green().bold());
                    return Ok(());
                }
                ClientEvent::PatchApplied { name } => {
                    println!("  {} {}", "applied:".green(), name);
                }
                ClientEvent::ApplyFailed { error } => {
                    println!("  {} {}", "apply failed:".red(), error);
                }
                ClientEvent::SyncFailed { reason, failed } => {
                    println!("{} Sync failed: {}", "✗".red().bold(), reason);
                    for participant in failed {
                        println!("  failed: {}", participant.to_string().yellow());
                    }
                    anyhow::bail!("session aborted");
                }
                ClientEvent::MergeFailed { reason } => {
                    println!("{} Merge failed: {}", "✗".red().bold(), reason);
                    anyhow::bail!("session aborted");
                }
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    anyhow::bail!("timed out waiting for session outcome")
}
