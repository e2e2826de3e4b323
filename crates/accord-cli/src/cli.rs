use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "accord",
    about = "Accord — patch consensus for shared trees",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Emit a unified diff between two files
    Diff(DiffArgs),
    /// Apply a unified diff to a file in place
    Apply(ApplyArgs),
    /// Three-way merge two files against a common base
    Merge(MergeArgs),
    /// Compute the content hash of a directory tree
    Hash(HashArgs),
    /// Build a patch from a working tree's changes against a base snapshot
    Patch(PatchArgs),
    /// Snapshot a directory into a backup store
    Snapshot(SnapshotArgs),
    /// Run the session coordinator
    Serve(ServeArgs),
    /// Join a coordinator as a participant
    Join(JoinArgs),
}

#[derive(Args)]
pub struct DiffArgs {
    pub old: String,
    pub new: String,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// File to patch in place
    pub file: String,
    /// Unified diff file
    pub patch: String,
    /// Retry with the smashed-line repair pass on failure
    #[arg(long)]
    pub repair: bool,
    /// Validate delimiter balance before writing
    #[arg(long)]
    pub check_syntax: bool,
}

#[derive(Args)]
pub struct MergeArgs {
    pub base: String,
    pub ours: String,
    pub theirs: String,
}

#[derive(Args)]
pub struct HashArgs {
    #[arg(default_value = ".")]
    pub dir: String,
}

#[derive(Args)]
pub struct PatchArgs {
    /// The base snapshot tree
    pub base: String,
    /// The modified working tree
    pub work: String,
    /// Patch name
    #[arg(long, default_value = "local-changes")]
    pub name: String,
    /// Output file (defaults to <name>.patch.json)
    #[arg(long)]
    pub out: Option<String>,
    /// Also write a metadata sidecar with literal before/after bodies
    #[arg(long)]
    pub metadata: bool,
}

#[derive(Args)]
pub struct SnapshotArgs {
    /// Directory to snapshot
    #[arg(default_value = ".")]
    pub dir: String,
    /// Backup store root
    #[arg(long, default_value = ".accord/backups")]
    pub store: String,
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file; flags below override it
    #[arg(long)]
    pub config: Option<String>,
    #[arg(long)]
    pub bind: Option<String>,
    /// Authoritative working tree
    #[arg(long)]
    pub root: Option<String>,
    /// Participants to wait for before starting a session
    #[arg(long, default_value = "2")]
    pub participants: usize,
    /// Validate delimiter balance when applying merged patches
    #[arg(long)]
    pub check_syntax: bool,
}

#[derive(Args)]
pub struct JoinArgs {
    /// Coordinator address, e.g. 127.0.0.1:7350
    pub addr: String,
    /// Participant name
    #[arg(long, default_value = "participant")]
    pub name: String,
    /// Local working tree
    #[arg(long, default_value = ".")]
    pub root: String,
    /// Patch files (JSON) to contribute
    #[arg(long = "patch")]
    pub patches: Vec<String>,
    /// Backup store used to serve snapshot requests
    #[arg(long)]
    pub store: Option<String>,
}
