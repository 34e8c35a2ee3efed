//! Bulk collection mover between MongoDB-compatible backends.
//!
//! This binary drives the docferry core: it exports collections from a source
//! backend with `mongodump`, stages them on disk, restores them into a target
//! backend with `mongorestore`, and runs group-and-count queries against
//! either backend kind.
//!
//! # Security Guarantees
//! - Passwords are read from the environment or an interactive prompt, never
//!   required on the command line
//! - Connection URIs are only ever printed or logged in redacted form

use clap::{Args, Parser, Subcommand, ValueEnum};
use docferry_core::{
    ArtifactStore, BackendKind, CollectionSelector, CollectionTask, Compression, ConnectionProfile,
    ConnectionProfileBuilder, DocFerryError, ExportCoordinator, ImportCoordinator,
    MigrationPipeline, ProcessToolRunner, Result, TlsMode, ToolPaths, TransferReport,
    logging::init_logging,
};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "docferry")]
#[command(about = "Move document collections between MongoDB-compatible backends")]
#[command(version)]
#[command(long_about = "
docferry - bulk collection mover

Exports collections from a source backend, stages them as dump files,
and restores them into a target backend. Either side can be a native
document store or a compatibility layer over a relational database.

SECURITY FEATURES:
- Passwords from DOCFERRY_SOURCE_PASSWORD / DOCFERRY_TARGET_PASSWORD or a prompt
- Connection strings are redacted in every log line and error

EXAMPLES:
  docferry export --source-host db1 --source-user admin --db reg --out /tmp/exp
  docferry import --target-kind compat --target-host adb --target-user REG \\
      --target-db REG --db reg --from /tmp/exp
  docferry migrate --source-host db1 --target-kind compat --target-host adb \\
      --target-user REG --target-db REG --db reg --collection users
  docferry top-groups --host adb --kind compat --user REG --auth-db REG \\
      --collection registrations --email-domain email --limit 10
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Export collections from the source backend into an artifact directory
    Export(ExportArgs),
    /// Import staged artifacts into the target backend
    Import(ImportArgs),
    /// Export from the source and import into the target in one run
    Migrate(MigrateArgs),
    /// List the artifacts staged under a directory
    Artifacts(ArtifactsArgs),
    /// Count documents per group key, largest groups first
    TopGroups(TopGroupsArgs),
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Machine-readable output
    #[arg(long, global = true, help = "Print results as JSON on stdout")]
    pub json: bool,

    /// Directory holding mongodump/mongorestore
    #[arg(
        long,
        global = true,
        env = "DOCFERRY_TOOLS_DIR",
        help = "Directory containing mongodump and mongorestore (default: PATH)"
    )]
    pub tools_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Native document store
    Native,
    /// Compatibility layer over a relational substrate
    Compat,
}

impl From<KindArg> for BackendKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Native => BackendKind::NativeDocument,
            KindArg::Compat => BackendKind::CompatibilityLayer,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TlsArg {
    /// Plain connection
    None,
    /// TLS with certificate validation
    Required,
    /// TLS accepting any certificate
    Insecure,
}

impl From<TlsArg> for TlsMode {
    fn from(tls: TlsArg) -> Self {
        match tls {
            TlsArg::None => TlsMode::None,
            TlsArg::Required => TlsMode::Required,
            TlsArg::Insecure => TlsMode::InsecureAcceptAnyCert,
        }
    }
}

/// Discrete connection fields, whichever flag prefix they came from.
struct ConnectionFields<'a> {
    label: &'a str,
    kind: KindArg,
    host: &'a str,
    port: Option<u16>,
    auth_db: Option<&'a str>,
    user: Option<&'a str>,
    password: Option<&'a str>,
    tls: Option<TlsArg>,
}

impl ConnectionFields<'_> {
    fn build(&self) -> Result<ConnectionProfile> {
        let mut builder = ConnectionProfileBuilder::new(self.kind.into()).host(self.host);
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(database) = self.auth_db {
            builder = builder.database(database);
        }
        if let Some(tls) = self.tls {
            builder = builder.tls(tls.into());
        }
        if let Some(user) = self.user {
            builder = builder.username(user);
            match self.password {
                Some(password) => builder = builder.password(password),
                None => {
                    if let Some(password) = prompt_password(self.label, user)? {
                        builder = builder.password(password);
                    }
                }
            }
        }

        let profile = builder.build()?;
        info!("{} backend: {}", self.label, profile);
        Ok(profile)
    }
}

/// Prompts for a password on the terminal; an empty answer means none.
fn prompt_password(label: &str, user: &str) -> Result<Option<String>> {
    let password = rpassword::prompt_password(format!("{} password for {}: ", label, user))
        .map_err(|e| DocFerryError::configuration(format!("Failed to read password: {}", e)))?;
    Ok((!password.is_empty()).then_some(password))
}

#[derive(Args)]
pub struct SourceArgs {
    /// Source backend kind
    #[arg(long, value_enum, default_value = "native")]
    pub source_kind: KindArg,

    /// Source host
    #[arg(long)]
    pub source_host: String,

    /// Source port (default 27017)
    #[arg(long)]
    pub source_port: Option<u16>,

    /// Source authentication database (schema for the compatibility layer)
    #[arg(long)]
    pub source_auth_db: Option<String>,

    /// Source user
    #[arg(long)]
    pub source_user: Option<String>,

    /// Source password
    #[arg(long, env = "DOCFERRY_SOURCE_PASSWORD", hide_env_values = true)]
    pub source_password: Option<String>,

    /// Source TLS mode
    #[arg(long, value_enum)]
    pub source_tls: Option<TlsArg>,
}

impl SourceArgs {
    fn profile(&self) -> Result<ConnectionProfile> {
        ConnectionFields {
            label: "Source",
            kind: self.source_kind,
            host: &self.source_host,
            port: self.source_port,
            auth_db: self.source_auth_db.as_deref(),
            user: self.source_user.as_deref(),
            password: self.source_password.as_deref(),
            tls: self.source_tls,
        }
        .build()
    }
}

#[derive(Args)]
pub struct TargetArgs {
    /// Target backend kind
    #[arg(long, value_enum, default_value = "native")]
    pub target_kind: KindArg,

    /// Target host
    #[arg(long)]
    pub target_host: String,

    /// Target port (default 27017)
    #[arg(long)]
    pub target_port: Option<u16>,

    /// Target authentication database (schema for the compatibility layer)
    #[arg(long)]
    pub target_auth_db: Option<String>,

    /// Target user
    #[arg(long)]
    pub target_user: Option<String>,

    /// Target password
    #[arg(long, env = "DOCFERRY_TARGET_PASSWORD", hide_env_values = true)]
    pub target_password: Option<String>,

    /// Target TLS mode
    #[arg(long, value_enum)]
    pub target_tls: Option<TlsArg>,
}

impl TargetArgs {
    fn profile(&self) -> Result<ConnectionProfile> {
        ConnectionFields {
            label: "Target",
            kind: self.target_kind,
            host: &self.target_host,
            port: self.target_port,
            auth_db: self.target_auth_db.as_deref(),
            user: self.target_user.as_deref(),
            password: self.target_password.as_deref(),
            tls: self.target_tls,
        }
        .build()
    }
}

#[derive(Args)]
pub struct TaskArgs {
    /// Source database
    #[arg(long)]
    pub db: Option<String>,

    /// Collection name, or "all"
    #[arg(long, default_value = "all")]
    pub collection: String,

    /// Rename the database on import
    #[arg(long, requires = "db")]
    pub target_db: Option<String>,

    /// Rename a single collection on import
    #[arg(long)]
    pub target_collection: Option<String>,

    /// Worker count passed through to the bulk tools
    #[arg(long)]
    pub parallelism: Option<u32>,

    /// Gzip-compressed artifacts
    #[arg(long)]
    pub gzip: bool,

    /// Skip index restoration on import
    #[arg(long)]
    pub no_index_restore: bool,
}

impl TaskArgs {
    fn task(&self) -> CollectionTask {
        let selector = CollectionSelector::parse(&self.collection);
        let mut task = match &self.db {
            Some(db) => CollectionTask::new(db.clone(), selector),
            None => CollectionTask {
                source: selector,
                ..CollectionTask::every_database()
            },
        };
        if let Some(db) = &self.target_db {
            task = task.with_target_database(db.clone());
        }
        if let Some(collection) = &self.target_collection {
            task = task.with_target_collection(collection.clone());
        }
        if let Some(workers) = self.parallelism {
            task = task.with_parallelism(workers);
        }
        task.with_compression(self.gzip)
            .with_index_restore(!self.no_index_restore)
    }
}

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub task: TaskArgs,

    /// Artifact directory
    #[arg(long, short)]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub task: TaskArgs,

    /// Artifact directory
    #[arg(long)]
    pub from: PathBuf,
}

#[derive(Args)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub task: TaskArgs,

    /// Staging directory for artifacts
    #[arg(long)]
    pub staging: PathBuf,
}

#[derive(Args)]
pub struct ArtifactsArgs {
    /// Artifact directory
    pub root: PathBuf,

    /// Only this database
    #[arg(long)]
    pub db: Option<String>,

    /// Look for gzip-compressed artifacts
    #[arg(long)]
    pub gzip: bool,
}

#[derive(Args)]
pub struct TopGroupsArgs {
    /// Backend kind
    #[arg(long, value_enum, default_value = "native")]
    pub kind: KindArg,

    /// Host
    #[arg(long)]
    pub host: String,

    /// Port (default 27017)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database (schema for the compatibility layer)
    #[arg(long)]
    pub auth_db: String,

    /// User
    #[arg(long)]
    pub user: Option<String>,

    /// Password
    #[arg(long, env = "DOCFERRY_SOURCE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// TLS mode
    #[arg(long, value_enum)]
    pub tls: Option<TlsArg>,

    /// Collection to aggregate
    #[arg(long)]
    pub collection: String,

    /// Group by this field path
    #[arg(long, conflicts_with = "email_domain", required_unless_present = "email_domain")]
    pub field: Option<String>,

    /// Group by the domain part of this email field
    #[arg(long)]
    pub email_domain: Option<String>,

    /// Keep only the largest groups
    #[arg(long)]
    pub limit: Option<u32>,
}

impl TopGroupsArgs {
    fn plan(&self) -> docferry_core::AggregationPlan {
        let key = match (&self.field, &self.email_domain) {
            (Some(field), _) => docferry_core::GroupKey::Field(field.clone()),
            (None, Some(email)) => docferry_core::GroupKey::EmailDomain(email.clone()),
            (None, None) => docferry_core::GroupKey::Field(String::new()),
        };
        let plan = docferry_core::AggregationPlan::new(self.collection.clone(), key);
        match self.limit {
            Some(limit) => plan.with_limit(limit),
            None => plan,
        }
    }

    fn profile(&self) -> Result<ConnectionProfile> {
        ConnectionFields {
            label: "Query",
            kind: self.kind,
            host: &self.host,
            port: self.port,
            auth_db: Some(&self.auth_db),
            user: self.user.as_deref(),
            password: self.password.as_deref(),
            tls: self.tls,
        }
        .build()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet)?;

    let runner = ProcessToolRunner::new(
        cli.global
            .tools_dir
            .as_ref()
            .map_or_else(ToolPaths::default, ToolPaths::from_dir),
    );

    let success = match &cli.command {
        Command::Export(args) => run_export(args, runner, &cli.global).await?,
        Command::Import(args) => run_import(args, runner, &cli.global).await?,
        Command::Migrate(args) => run_migrate(args, runner, &cli.global).await?,
        Command::Artifacts(args) => list_artifacts(args, &cli.global)?,
        Command::TopGroups(args) => top_groups(args, &cli.global).await?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Cancels the token on Ctrl-C; running tool calls finish first.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: stopping after the current collection");
            child.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| DocFerryError::serialization("JSON output", e))?;
    println!("{}", rendered);
    Ok(())
}

fn print_report(report: &TransferReport) {
    for outcome in &report.outcomes {
        let status = match &outcome.status {
            docferry_core::TransferStatus::Succeeded {
                documents_restored,
                documents_failed,
                ..
            } => match documents_restored {
                Some(restored) => format!("ok ({} restored, {} failed)", restored, documents_failed),
                None => "ok".to_string(),
            },
            docferry_core::TransferStatus::Failed { reason } => format!("FAILED: {}", reason),
            docferry_core::TransferStatus::Skipped { reason } => format!("skipped: {}", reason),
        };
        println!("{} -> {}: {}", outcome.source_namespace(), outcome.target_namespace, status);
    }
    println!(
        "{:?}: {} succeeded, {} failed, {} skipped",
        report.operation,
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
}

async fn run_export(args: &ExportArgs, runner: ProcessToolRunner, global: &GlobalArgs) -> Result<bool> {
    let profile = args.source.profile()?;
    let coordinator = ExportCoordinator::new(runner, ArtifactStore::new(&args.out));

    let summary = coordinator.export(&profile, &args.task.task()).await?;
    if global.json {
        print_json(&summary)?;
    } else {
        print_report(&summary.report);
    }
    Ok(summary.report.is_success() || summary.artifacts.is_empty())
}

async fn run_import(args: &ImportArgs, runner: ProcessToolRunner, global: &GlobalArgs) -> Result<bool> {
    let profile = args.target.profile()?;
    let store = ArtifactStore::new(&args.from);
    let coordinator = ImportCoordinator::new(runner);

    let report = coordinator
        .import(&profile, &store, &args.task.task(), &cancel_on_interrupt())
        .await?;
    if global.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(report.is_success())
}

async fn run_migrate(args: &MigrateArgs, runner: ProcessToolRunner, global: &GlobalArgs) -> Result<bool> {
    let source = args.source.profile()?;
    let target = args.target.profile()?;
    let pipeline = MigrationPipeline::new(runner, ArtifactStore::new(&args.staging));

    let summary = pipeline
        .migrate(&source, &target, &args.task.task(), &cancel_on_interrupt())
        .await?;
    if global.json {
        print_json(&summary)?;
    } else {
        print_report(&summary.export.report);
        print_report(&summary.import);
    }
    Ok(summary.is_success())
}

fn list_artifacts(args: &ArtifactsArgs, global: &GlobalArgs) -> Result<bool> {
    let store = ArtifactStore::new(&args.root);
    let compression = Compression::from_flag(args.gzip);
    let artifacts = match &args.db {
        Some(db) => store.discover_database(db, compression)?,
        None => store.discover(compression)?,
    };

    if global.json {
        print_json(&artifacts)?;
    } else {
        for artifact in &artifacts {
            let metadata = if artifact.has_metadata() { "" } else { " (no metadata)" };
            println!("{}  {}{}", artifact.namespace(), artifact.data_path.display(), metadata);
        }
    }
    Ok(true)
}

#[cfg(feature = "mongodb")]
async fn top_groups(args: &TopGroupsArgs, global: &GlobalArgs) -> Result<bool> {
    let profile = args.profile()?;
    let backend = docferry_core::MongoQueryBackend::connect(&profile).await?;
    let result = docferry_core::QueryAdapter::new()
        .aggregate(&backend, &args.plan())
        .await?;

    if global.json {
        print_json(&result)?;
    } else {
        for group in &result.groups {
            println!("{:>10}  {}", group.count, group.group_key);
        }
        if !result.dropped_rows.is_empty() {
            warn!("{} result row(s) could not be parsed", result.dropped_rows.len());
        }
    }
    Ok(true)
}

#[cfg(not(feature = "mongodb"))]
async fn top_groups(args: &TopGroupsArgs, _global: &GlobalArgs) -> Result<bool> {
    args.plan().validate()?;
    Err(DocFerryError::configuration(
        "top-groups requires a build with the 'mongodb' feature",
    ))
}
