use std::env;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tether_config::{load_config, Config};
use tether_core::logging::{filter_directive, prepare_log_dir, Rotation};
use tether_core::{apply_edits, AppPaths, EditorPosition};
use tether_lsp::{Bridge, BridgeSettings, StdioConnector};

/// Open one file through its language server and report what the server says.
#[derive(Debug, Parser)]
#[command(name = "tether", version)]
struct Args {
    /// File to open
    file: PathBuf,

    /// Line (1-based) for completion, definition and rename
    #[arg(long, requires = "column", value_parser = clap::value_parser!(u32).range(1..))]
    line: Option<u32>,

    /// Column (1-based) for completion, definition and rename
    #[arg(long, requires = "line", value_parser = clap::value_parser!(u32).range(1..))]
    column: Option<u32>,

    /// Rename the symbol at --line/--column
    #[arg(long, requires = "line", value_name = "NAME")]
    rename: Option<String>,

    /// Print the file as formatted by the server
    #[arg(long)]
    format: bool,

    /// Milliseconds to wait for diagnostics
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    wait: u64,
}

impl Args {
    fn position(&self) -> Option<EditorPosition> {
        Some(EditorPosition::new(self.line?, self.column?))
    }

    fn wait(&self) -> Duration {
        Duration::from_millis(self.wait)
    }
}

fn init_logging(config: &Config, paths: &AppPaths) -> Result<PathBuf> {
    let log_path = config.log.file.clone().unwrap_or_else(|| paths.log_file());
    prepare_log_dir(&log_path).context("failed to create log directory")?;
    Rotation::default()
        .rotate_if_needed(&log_path)
        .context("failed to rotate log file")?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config.log.level.as_str())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(log_path)
}

/// Where a file lives: `<root>/<workspace_id>/<relative>`.
#[derive(Debug, PartialEq)]
struct Placement {
    workspace_id: String,
    root: String,
    relative: String,
}

/// Place `file` under the configured workspace root. Files outside it use
/// `cwd` as the workspace and its parent as the root.
fn workspace_for(file: &Path, workspace_root: &str, cwd: &Path) -> Result<Placement> {
    if let Some(placement) = under_root(file, workspace_root) {
        return Ok(placement);
    }
    let workspace_id = cwd
        .file_name()
        .and_then(|n| n.to_str())
        .context("current directory has no usable name")?
        .to_string();
    let root = cwd
        .parent()
        .and_then(|p| p.to_str())
        .context("current directory has no parent")?
        .to_string();
    let relative = file
        .strip_prefix(cwd)
        .with_context(|| format!("{} is not inside {}", file.display(), cwd.display()))?
        .to_str()
        .context("file path is not UTF-8")?
        .to_string();
    Ok(Placement {
        workspace_id,
        root,
        relative,
    })
}

fn under_root(file: &Path, workspace_root: &str) -> Option<Placement> {
    let rest = file.strip_prefix(workspace_root).ok()?;
    let mut components = rest.components();
    let workspace_id = match components.next()? {
        Component::Normal(name) => name.to_str()?.to_string(),
        _ => return None,
    };
    let relative = components.as_path().to_str()?;
    if relative.is_empty() {
        return None;
    }
    Some(Placement {
        workspace_id,
        root: workspace_root.to_string(),
        relative: relative.to_string(),
    })
}

fn connector_for(config: &Config) -> StdioConnector {
    config
        .lsp
        .servers
        .iter()
        .fold(StdioConnector::new(), |connector, (language, entry)| {
            connector.with_server(language.clone(), entry.command.clone(), entry.args.clone())
        })
}

async fn run(args: Args, config: Config) -> Result<()> {
    let file = args
        .file
        .canonicalize()
        .with_context(|| format!("failed to open: {}", args.file.display()))?;
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read: {}", file.display()))?;

    if !config.lsp.enabled {
        println!("language servers are disabled in the configuration");
        return Ok(());
    }
    let Some(language) = config.lsp.language_for_path(&file).map(str::to_string) else {
        println!("no language server configured for {}", file.display());
        return Ok(());
    };

    let cwd = env::current_dir().context("failed to read current directory")?;
    let Placement {
        workspace_id,
        root,
        relative,
    } = workspace_for(&file, &config.lsp.workspace_root, &cwd)?;
    let settings = BridgeSettings {
        debounce: config.lsp.debounce(),
        request_timeout: config.lsp.request_timeout(),
        workspace_root: root,
        token: None,
    };
    let bridge = Bridge::new(workspace_id, Arc::new(connector_for(&config)), settings);
    let uri = bridge.document_uri(&relative);
    info!(%uri, %language, "opening document");

    bridge
        .open_document(&uri, &language, &text)
        .await
        .with_context(|| format!("failed to start the {language} language server"))?;

    tokio::time::sleep(args.wait()).await;
    let problems = bridge.diagnostics().problems(&uri);
    if problems.is_empty() {
        println!("{relative}: no problems");
    }
    for problem in &problems {
        println!("{relative}:{problem}");
    }

    if let Some(at) = args.position() {
        for suggestion in bridge.completion(&uri, at).await {
            match &suggestion.detail {
                Some(detail) => println!("completion: {} ({detail})", suggestion.label),
                None => println!("completion: {}", suggestion.label),
            }
        }
        for location in bridge.definition(&uri, at).await {
            println!("definition: {} {}", location.uri, location.range);
        }
        if let Some(new_name) = &args.rename {
            match bridge.rename(&uri, at, new_name).await? {
                Some(result) => {
                    for (target, edits) in &result.changes {
                        println!("rename: {target} ({} edits)", edits.len());
                    }
                }
                None => println!("rename: nothing to change"),
            }
        }
    }

    if args.format {
        let edits = bridge.format(&uri).await.context("formatting failed")?;
        let formatted = apply_edits(&text, &edits).context("server sent unusable edits")?;
        print!("{formatted}");
    }

    bridge.shutdown();
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = try_main(args) {
        eprintln!("tether: {:#}", e);
        std::process::exit(1);
    }
}

fn try_main(args: Args) -> Result<()> {
    let paths = AppPaths::discover().context("failed to detect home directory")?;

    let project_dir = env::current_dir().ok();
    let (config, config_error) = match load_config(&paths.config_dir(), project_dir.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    let log_path = init_logging(&config, &paths)?;
    info!(log = %log_path.display(), "tether starting");
    if let Some(e) = config_error {
        warn!("config load failed, using defaults: {}", e);
        eprintln!("tether: config load failed, using defaults: {e}");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run(args, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("tether").chain(list.iter().copied()))
    }

    #[test]
    fn file_only() {
        let parsed = parse(&["main.py"]).unwrap();
        assert_eq!(parsed.file, PathBuf::from("main.py"));
        assert_eq!(parsed.position(), None);
        assert!(!parsed.format);
        assert_eq!(parsed.wait(), Duration::from_millis(2000));
    }

    #[test]
    fn position_and_rename() {
        let parsed = parse(&[
            "--line", "3", "--column", "7", "--rename", "total", "src/a.py",
        ])
        .unwrap();
        assert_eq!(parsed.position(), Some(EditorPosition::new(3, 7)));
        assert_eq!(parsed.rename.as_deref(), Some("total"));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--line", "3", "a.py"]).is_err());
        assert!(parse(&["--line", "x", "--column", "1", "a.py"]).is_err());
        assert!(parse(&["--line", "0", "--column", "1", "a.py"]).is_err());
        assert!(parse(&["--rename", "n", "a.py"]).is_err());
        assert!(parse(&["--bogus", "a.py"]).is_err());
        assert!(parse(&["a.py", "b.py"]).is_err());
    }

    #[test]
    fn file_under_workspace_root_uses_its_workspace() {
        let placement = workspace_for(
            Path::new("/workspaces/demo/src/app.py"),
            "/workspaces",
            Path::new("/home/me/elsewhere"),
        )
        .unwrap();
        assert_eq!(
            placement,
            Placement {
                workspace_id: "demo".into(),
                root: "/workspaces".into(),
                relative: "src/app.py".into(),
            }
        );
    }

    #[test]
    fn file_outside_workspace_root_uses_current_directory() {
        let placement = workspace_for(
            Path::new("/home/me/project/lib/util.py"),
            "/workspaces",
            Path::new("/home/me/project"),
        )
        .unwrap();
        assert_eq!(placement.workspace_id, "project");
        assert_eq!(placement.root, "/home/me");
        assert_eq!(placement.relative, "lib/util.py");
    }

    #[test]
    fn file_directly_in_workspace_root_falls_back() {
        let placement = workspace_for(
            Path::new("/workspaces/notes.py"),
            "/workspaces",
            Path::new("/workspaces"),
        )
        .unwrap();
        assert_eq!(placement.workspace_id, "workspaces");
        assert_eq!(placement.relative, "notes.py");
    }

    #[test]
    fn file_outside_both_is_an_error() {
        assert!(workspace_for(Path::new("/tmp/x.py"), "/workspaces", Path::new("/home/me")).is_err());
    }

    #[test]
    fn connector_has_configured_servers() {
        let config = tether_config::load_from_str(
            "[lsp.servers.python]\ncommand = \"pylsp\"\nextensions = [\"py\"]\n",
        )
        .unwrap();
        let connector = connector_for(&config);
        assert_eq!(connector.server("python").unwrap().command, "pylsp");
        assert!(connector.server("rust").is_none());
    }
}
