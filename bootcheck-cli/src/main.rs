use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bootcheck::{CaseReport, CheckError, CheckOptions, CheckOutcome};

/// Verify that built disk images boot and reach a healthy state.
#[derive(Parser, Debug)]
#[command(name = "bootcheck", version, about)]
struct Cli {
    /// Do not boot images locally using qemu. Affected checks are
    /// skipped; cloud checks are unaffected unless they would fall back
    /// to qemu because of missing credentials.
    #[arg(long)]
    disable_local_boot: bool,

    /// Directory scanned for test cases when none are named.
    #[arg(long, value_name = "DIR")]
    cases_dir: Option<PathBuf>,

    /// Image builder binary.
    #[arg(long, value_name = "PATH")]
    osbuild: Option<PathBuf>,

    /// Metadata inspection binary.
    #[arg(long, value_name = "PATH")]
    image_info: Option<PathBuf>,

    /// User the readiness probe logs in as.
    #[arg(long, value_name = "USER")]
    ssh_user: Option<String>,

    /// Private key for locally booted images.
    #[arg(long, value_name = "PATH")]
    private_key: Option<PathBuf>,

    /// Test case files to run; every file in the case directory when
    /// empty.
    cases: Vec<PathBuf>,
}

impl Cli {
    fn to_options(&self) -> CheckOptions {
        let mut opts = CheckOptions {
            disable_local_boot: self.disable_local_boot,
            ..CheckOptions::default()
        };
        if let Some(dir) = &self.cases_dir {
            opts.cases_dir = dir.clone();
        }
        if let Some(path) = &self.osbuild {
            opts.osbuild = path.clone();
        }
        if let Some(path) = &self.image_info {
            opts.image_info = path.clone();
        }
        if let Some(user) = &self.ssh_user {
            opts.ssh_user = user.clone();
        }
        if let Some(key) = &self.private_key {
            opts.private_key = key.clone();
        }
        opts
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let opts = cli.to_options();

    let reports = match bootcheck::runner::run(cli.cases, &opts).await {
        Ok(reports) => reports,
        Err(CheckError::Config(msg)) => {
            eprintln!("fatal: configuration error: {msg}");
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e.into()),
    };

    let failed = print_reports(&reports);
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print one line per sub-check plus a summary; returns the number of
/// failed checks.
fn print_reports(reports: &[CaseReport]) -> usize {
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);

    for report in reports {
        for check in &report.checks {
            match &check.outcome {
                CheckOutcome::Passed => {
                    passed += 1;
                    println!("PASS {}/{}", report.name, check.name);
                }
                CheckOutcome::Failed(reason) => {
                    failed += 1;
                    println!("FAIL {}/{}: {reason}", report.name, check.name);
                }
                CheckOutcome::Skipped(reason) => {
                    skipped += 1;
                    println!("SKIP {}/{}: {reason}", report.name, check.name);
                }
            }
        }
    }

    println!("{passed} passed, {failed} failed, {skipped} skipped");
    failed
}
