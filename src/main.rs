use clap::Parser;
use tracing_subscriber::EnvFilter;
use ultra_lean_mcp_proxy::cli::{Cli, CliOverrides};
use ultra_lean_mcp_proxy::{config, session};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let overrides = CliOverrides::from(&cli);
    let resolved = match config::resolve(cli.config.as_deref(), &overrides, &cli.upstream) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("ultra-lean-mcp-proxy: {err}");
            std::process::exit(1);
        }
    };

    if cli.dump_effective_config {
        let document = resolved.effective_document();
        println!("{}", serde_json::to_string_pretty(&document).unwrap_or_default());
        std::process::exit(0);
    }

    if cli.upstream.is_empty() {
        eprintln!("ultra-lean-mcp-proxy: no upstream command given (pass it after `--`)");
        std::process::exit(1);
    }

    let code = session::run(resolved, cli.upstream).await;
    std::process::exit(code);
}

/// `RUST_LOG` wins when set; otherwise `-v/--verbose` raises the proxy's own
/// default filter from `info` to `debug` before falling back to `info`.
fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "ultra_lean_mcp_proxy=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
