//! treeshift - Move, copy and delete elements of a source tree.
//!
//! Usage:
//!   tshift show                          List projects, namespaces and units
//!   tshift classify ELEMENT...           Show how a selection would be handled
//!   tshift move ELEMENT... --to DEST     Move elements, updating references
//!   tshift copy ELEMENT... --to DEST     Copy elements
//!   tshift delete ELEMENT...             Delete elements
//!   tshift replay FILE                   Plan a recorded operation again
//!
//! Elements are given as handles (see `tshift show`). Operations only print
//! their plan unless `--apply` is passed.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use treeshift_core::{Element, ElementHandle, ReorgConfig, Severity, Workspace};
use treeshift_ops::{
    ApplyResult, AutoConfirm, ConfirmAnswer, ConfirmQuery, ConfirmationContext, DeltaKind,
    DescriptorOperation, ManifestGuard, NewNameQuery, NewNameTarget, Question, RecordedDecisions,
    ReorgDescriptor, ReorgOperation, ReorgPlan, ReorgProcessor, Selection, element_label, start_apply,
};
use treeshift_scan::{LoadedWorkspace, ProjectScanner, ScanConfig, WorkspaceWriter};

#[derive(Parser)]
#[command(
    name = "treeshift",
    version,
    about = "Move, copy and delete elements of a source tree",
    long_about = "treeshift reorganizes projects, namespaces, source units and members \
                  while keeping imports, qualified references and namespace \
                  declarations consistent.\n\n\
                  Operations print their plan; pass --apply to execute and write \
                  the result back to disk."
)]
struct Cli {
    /// Workspace root; every sub-directory is a project
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Reorganization settings (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List projects, source roots, namespaces and units with their handles
    Show {
        /// Also list types and members
        #[arg(short, long)]
        members: bool,
    },

    /// Show how a selection would be copied or moved
    Classify {
        /// Element handles
        #[arg(required = true)]
        elements: Vec<String>,

        /// Operation to classify for
        #[arg(short, long, default_value = "move")]
        operation: OperationArg,
    },

    /// Move elements
    Move {
        /// Element handles
        #[arg(required = true)]
        elements: Vec<String>,

        /// Destination handle
        #[arg(short, long)]
        to: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Copy elements
    Copy {
        /// Element handles
        #[arg(required = true)]
        elements: Vec<String>,

        /// Destination handle
        #[arg(short, long)]
        to: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Delete elements
    Delete {
        /// Element handles
        #[arg(required = true)]
        elements: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Plan a recorded operation against the current workspace
    Replay {
        /// Descriptor written by --record
        descriptor: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Execute the plan and write the workspace back to disk
    #[arg(short, long)]
    apply: bool,

    /// Answer every question with yes and accept suggested names
    #[arg(short, long)]
    yes: bool,

    /// Answer questions from recorded decisions (JSON) first
    #[arg(short, long)]
    decisions: Option<PathBuf>,

    /// Write a replayable descriptor of the operation (JSON)
    #[arg(long)]
    record: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OperationArg {
    Copy,
    Move,
}

impl From<OperationArg> for ReorgOperation {
    fn from(op: OperationArg) -> Self {
        match op {
            OperationArg::Copy => Self::Copy,
            OperationArg::Move => Self::Move,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let scan_config = ScanConfig {
        source_extension: config.source_extension.clone(),
        ..ScanConfig::new(&cli.root)
    };

    let mut loaded = ProjectScanner::new(scan_config.clone())
        .scan()
        .with_context(|| format!("Failed to load {}", cli.root.display()))?;
    for warning in &loaded.warnings {
        eprintln!("warning: {}: {}", warning.path.display(), warning.message);
    }

    let processor = ReorgProcessor::new(config.clone())
        .with_consumer(Box::new(ManifestGuard::new(scan_config.manifest_name.clone())));
    let session = Session {
        processor: &processor,
        scan_config: &scan_config,
        format: cli.format,
    };

    match cli.command {
        Command::Show { members } => run_show(&loaded.workspace, members, cli.format)?,
        Command::Classify { elements, operation } => {
            run_classify(&processor, &loaded.workspace, &elements, operation.into(), cli.format)?
        }
        Command::Move { elements, to, run } => {
            session.run_reorg(&mut loaded, DescriptorOperation::Move, &elements, Some(&to), &run)?
        }
        Command::Copy { elements, to, run } => {
            session.run_reorg(&mut loaded, DescriptorOperation::Copy, &elements, Some(&to), &run)?
        }
        Command::Delete { elements, run } => {
            session.run_reorg(&mut loaded, DescriptorOperation::Delete, &elements, None, &run)?
        }
        Command::Replay { descriptor, run } => session.run_replay(&mut loaded, &descriptor, &run)?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ReorgConfig> {
    let Some(path) = path else {
        return Ok(ReorgConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid configuration {}", path.display()))
}

fn resolve(ws: &Workspace, handle: &str) -> Result<Element> {
    let parsed: ElementHandle = handle.parse()?;
    ws.resolve_handle(&parsed)
        .with_context(|| format!("Cannot resolve '{handle}'"))
}

fn resolve_all(ws: &Workspace, handles: &[String]) -> Result<Selection> {
    let elements = handles.iter().map(|h| resolve(ws, h)).collect::<Result<Vec<_>>>()?;
    Ok(Selection::from_elements(elements))
}

/// Show command output entry.
#[derive(Serialize)]
struct ShowEntry {
    handle: String,
    kind: &'static str,
    depth: usize,
    read_only: bool,
}

fn run_show(ws: &Workspace, members: bool, format: OutputFormat) -> Result<()> {
    let mut entries = Vec::new();
    let mut push = |ws: &Workspace, id, depth| {
        let element = Element::Symbol(id);
        let handle = ws
            .handle_for(element)
            .map(|h| h.to_string())
            .unwrap_or_else(|| element_label(ws, element));
        entries.push(ShowEntry {
            handle,
            kind: ws.symbol(id).kind.label(),
            depth,
            read_only: ws.is_read_only_symbol(id),
        });
    };

    for &project in ws.projects() {
        push(ws, project, 0);
        for &root in &ws.symbol(project).children {
            push(ws, root, 1);
            for ns in ws.namespaces_of_root(root) {
                push(ws, ns, 2);
                for unit in ws.units_of(ns) {
                    push(ws, unit, 3);
                    if members {
                        for ty in ws.top_level_types(unit) {
                            push(ws, ty, 4);
                            for &member in &ws.symbol(ty).children {
                                push(ws, member, 5);
                            }
                        }
                    }
                }
            }
        }
    }

    match format {
        OutputFormat::Text => {
            for entry in &entries {
                let marker = if entry.read_only { " (read-only)" } else { "" };
                println!(
                    "{}{}  [{}]{}",
                    "  ".repeat(entry.depth),
                    entry.handle,
                    entry.kind,
                    marker
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }
    Ok(())
}

/// Classify command output.
#[derive(Serialize)]
struct Classification {
    applicable: bool,
    kind: Option<String>,
    common_parent: Option<String>,
    elements: Vec<String>,
    reason: Option<String>,
}

fn run_classify(
    processor: &ReorgProcessor,
    ws: &Workspace,
    handles: &[String],
    operation: ReorgOperation,
    format: OutputFormat,
) -> Result<()> {
    let selection = resolve_all(ws, handles)?;
    let report = match processor.classify(ws, &selection, operation) {
        Ok(policy) => Classification {
            applicable: true,
            kind: Some(policy.kind.to_string()),
            common_parent: Some(element_label(ws, policy.common_parent)),
            elements: policy.selection.elements().map(|e| element_label(ws, e)).collect(),
            reason: None,
        },
        Err(reason) => Classification {
            applicable: false,
            kind: None,
            common_parent: None,
            elements: Vec::new(),
            reason: Some(reason.to_string()),
        },
    };

    match format {
        OutputFormat::Text => match (&report.kind, &report.reason) {
            (Some(kind), _) => {
                println!("{operation} policy: {kind}");
                println!("Common parent: {}", report.common_parent.as_deref().unwrap_or("-"));
                for element in &report.elements {
                    println!("  {element}");
                }
            }
            (None, reason) => println!("Not applicable: {}", reason.as_deref().unwrap_or("-")),
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

/// Settings shared by the planning commands.
struct Session<'a> {
    processor: &'a ReorgProcessor,
    scan_config: &'a ScanConfig,
    format: OutputFormat,
}

impl Session<'_> {
    fn run_reorg(
        &self,
        loaded: &mut LoadedWorkspace,
        operation: DescriptorOperation,
        handles: &[String],
        destination: Option<&str>,
        run: &RunArgs,
    ) -> Result<()> {
        let elements = handles
            .iter()
            .map(|h| h.parse::<ElementHandle>().with_context(|| format!("Invalid handle '{h}'")))
            .collect::<Result<Vec<ElementHandle>>>()?;
        let destination = destination
            .map(|d| d.parse::<ElementHandle>().with_context(|| format!("Invalid handle '{d}'")))
            .transpose()?;
        let mut descriptor = ReorgDescriptor::new(operation, elements, destination, self.processor.config().clone());
        let recorded = load_decisions(run.decisions.as_deref())?;

        let ws = &mut loaded.workspace;
        let plan = self.with_queries(run, recorded.as_ref(), |ctx| {
            self.processor.plan_descriptor(ws, &descriptor, ctx)
        })?;

        if let Some(path) = &run.record {
            descriptor.decisions = plan.decisions.clone();
            std::fs::write(path, descriptor.to_json()?)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            eprintln!("Recorded to {}", path.display());
        }

        self.finish(loaded, plan, run)
    }

    fn run_replay(&self, loaded: &mut LoadedWorkspace, path: &Path, run: &RunArgs) -> Result<()> {
        let json = std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
        let descriptor = ReorgDescriptor::from_json(&json)?;
        let processor = ReorgProcessor::new(descriptor.config.clone())
            .with_consumer(Box::new(ManifestGuard::new(self.scan_config.manifest_name.clone())));

        let ws = &mut loaded.workspace;
        let plan = self.with_queries(run, Some(&descriptor.decisions), |ctx| {
            processor.plan_descriptor(ws, &descriptor, ctx)
        })?;
        self.finish(loaded, plan, run)
    }

    /// Run `plan` with the query services selected by `run`.
    fn with_queries<T>(
        &self,
        run: &RunArgs,
        recorded: Option<&RecordedDecisions>,
        plan: impl FnOnce(&mut ConfirmationContext<'_>) -> Result<T, treeshift_ops::ReorgError>,
    ) -> Result<T> {
        let (mut auto_queries, mut auto_names) = (AutoConfirm, AutoConfirm);
        let (mut terminal_queries, mut terminal_names) = (TerminalQueries, TerminalQueries);
        let (queries, names): (&mut dyn ConfirmQuery, &mut dyn NewNameQuery) = if run.yes {
            (&mut auto_queries, &mut auto_names)
        } else {
            (&mut terminal_queries, &mut terminal_names)
        };
        let mut ctx = ConfirmationContext::new(queries, names);
        if let Some(recorded) = recorded {
            ctx = ctx.with_replay(recorded);
        }
        Ok(plan(&mut ctx)?)
    }

    fn finish(&self, loaded: &mut LoadedWorkspace, plan: ReorgPlan, run: &RunArgs) -> Result<()> {
        self.print_plan(&plan)?;

        if plan.status.has_fatal() {
            bail!("{}", plan.status.message().unwrap_or("Operation rejected"));
        }
        let Some(change) = plan.change else {
            eprintln!("Nothing to do.");
            return Ok(());
        };
        if !run.apply {
            eprintln!("Dry run; pass --apply to execute.");
            return Ok(());
        }
        if plan.status.severity() >= Severity::Warning && !run.yes {
            let answer = TerminalQueries::ask("Continue despite the problems above? [y/N]");
            if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
                bail!("Aborted");
            }
        }

        let workspace = std::mem::take(&mut loaded.workspace);
        let (workspace, complete) = apply(workspace, change)?;
        loaded.workspace = workspace;
        if let Some(error) = complete.error {
            bail!("{} rolled back: {error}", complete.change);
        }
        eprintln!("{}", complete.summary());

        let summary = WorkspaceWriter::new(self.scan_config.clone())
            .write(loaded)
            .context("Failed to write workspace")?;
        for skipped in &summary.skipped {
            eprintln!("warning: {}: {}", skipped.path.display(), skipped.message);
        }
        eprintln!(
            "Wrote {} file(s), removed {} entr{}",
            summary.written,
            summary.removed,
            if summary.removed == 1 { "y" } else { "ies" }
        );
        Ok(())
    }

    fn print_plan(&self, plan: &ReorgPlan) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                #[derive(Serialize)]
                struct Report<'a> {
                    #[serde(flatten)]
                    plan: &'a ReorgPlan,
                    steps: Vec<String>,
                }
                let report = Report {
                    plan,
                    steps: plan.steps(),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Text => {
                println!();
                println!("{}", "─".repeat(60));
                println!(" {}", plan.description);
                println!("{}", "─".repeat(60));
                for entry in plan.status.entries() {
                    println!(" {:<8} {}", entry.severity.to_string().to_lowercase(), entry.message);
                }
                let steps = plan.steps();
                if !steps.is_empty() {
                    println!();
                    println!(" Steps:");
                    for step in steps {
                        println!("   {step}");
                    }
                }
                if !plan.delta.is_empty() {
                    println!();
                    println!(" Resources:");
                    for entry in plan.delta.entries() {
                        let marker = match entry.kind {
                            DeltaKind::Added => '+',
                            DeltaKind::Removed => '-',
                            DeltaKind::Changed => '~',
                        };
                        match &entry.moved_from {
                            Some(from) => println!("   {marker} {} (from {})", entry.path.display(), from.display()),
                            None => println!("   {marker} {}", entry.path.display()),
                        }
                    }
                }
                println!();
            }
        }
        Ok(())
    }
}

fn load_decisions(path: Option<&Path>) -> Result<Option<RecordedDecisions>> {
    path.map(|path| {
        let json = std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
        RecordedDecisions::from_json(&json).map_err(|e| eyre!("Invalid decisions {}: {e}", path.display()))
    })
    .transpose()
}

/// Execute `change` on a worker, reporting progress on stderr.
fn apply(workspace: Workspace, change: treeshift_ops::Change) -> Result<(Workspace, treeshift_ops::ApplyComplete)> {
    let runtime = tokio::runtime::Runtime::new()?;
    let shared = Arc::new(Mutex::new(workspace));
    let complete = runtime.block_on({
        let shared = Arc::clone(&shared);
        async move {
            let mut rx = start_apply(shared, change, CancellationToken::new());
            while let Some(message) = rx.recv().await {
                match message {
                    ApplyResult::Progress(progress) => {
                        if let Some(step) = &progress.current_step {
                            eprintln!("[{:>3.0}%] {step}", progress.percentage());
                        }
                    }
                    ApplyResult::Complete(complete) => return Some(complete),
                }
            }
            None
        }
    });
    let complete = complete.ok_or_else(|| eyre!("Change execution stopped without a result"))?;
    let workspace = std::mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner));
    Ok((workspace, complete))
}

/// Asks questions on the terminal.
struct TerminalQueries;

impl TerminalQueries {
    fn ask(prompt: &str) -> String {
        eprint!("{prompt} ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(_) => line.trim().to_string(),
            Err(_) => String::new(),
        }
    }
}

impl ConfirmQuery for TerminalQueries {
    fn confirm(&mut self, question: &Question) -> bool {
        let answer = Self::ask(&format!("{} [y/N]", question.message));
        matches!(answer.to_lowercase().as_str(), "y" | "yes")
    }

    fn confirm_all(&mut self, question: &Question) -> ConfirmAnswer {
        let answer = Self::ask(&format!("{} [y]es/[N]o/[a]ll/n[o]ne", question.message));
        match answer.to_lowercase().as_str() {
            "y" | "yes" => ConfirmAnswer::Yes,
            "a" | "all" => ConfirmAnswer::YesToAll,
            "o" | "none" => ConfirmAnswer::NoToAll,
            _ => ConfirmAnswer::No,
        }
    }
}

impl NewNameQuery for TerminalQueries {
    fn new_name(&mut self, target: NewNameTarget, original: &str, suggestion: &str) -> Option<String> {
        let answer = Self::ask(&format!(
            "'{original}' exists at the destination. New {target} name [{suggestion}] (- to skip):"
        ));
        match answer.as_str() {
            "-" => None,
            "" => Some(suggestion.to_string()),
            name => Some(name.to_string()),
        }
    }
}
