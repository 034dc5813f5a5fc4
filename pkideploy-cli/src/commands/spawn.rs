use crate::cli::{GlobalFlags, parse_override, parse_subsystem};
use anyhow::Context;
use clap::Args;
use pkideploy::params::DeployMode;
use pkideploy::{Deployer, SpawnOutcome, SpawnRequest, Subsystem, util};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SpawnArgs {
    /// Subsystem to install (CA, KRA, OCSP, TKS, TPS)
    #[arg(short, long, value_parser = parse_subsystem)]
    pub subsystem: Subsystem,

    /// Deployment configuration file layered over the defaults
    #[arg(short = 'f', long = "file")]
    pub config: Option<PathBuf>,

    /// Override a parameter of the subsystem section (key=value, repeatable)
    #[arg(short = 'o', long = "set", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,
}

pub async fn execute(args: SpawnArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let (_log_guard, log_file) = util::init_logging(
        &global.log_dir,
        args.subsystem,
        DeployMode::Spawn,
        global.env_filter(),
    )
    .context("Installation failed: cannot open log file")?;

    tracing::info!(subsystem = %args.subsystem, log = %log_file.display(), "Starting installation");
    let request = SpawnRequest {
        default_config: global.default_config(),
        user_config: args.config,
        slots_config: global.slots_config(),
        subsystem: args.subsystem,
        overrides: args.overrides,
        log_file: Some(log_file.clone()),
    };

    let report = match Deployer::default().spawn(request).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Installation failed");
            eprintln!("Installation log: {}", log_file.display());
            return Err(e).context(format!("Installation failed for {}", args.subsystem));
        }
    };

    match report.outcome {
        SpawnOutcome::Finalized => {
            println!(
                "Installed {} in instance '{}'",
                args.subsystem, report.instance_name
            );
        }
        SpawnOutcome::StepOneComplete { csr_paths } => {
            println!(
                "Step one of the {} installation in instance '{}' is complete.",
                args.subsystem, report.instance_name
            );
            println!("Certificate signing requests were written to:");
            for path in &csr_paths {
                println!("  {}", path.display());
            }
            println!(
                "Have them signed, then re-run with pki_external_step_two = True to finish."
            );
        }
    }
    println!("Manifest: {}", report.manifest_path.display());
    println!("Installation log: {}", log_file.display());
    tracing::info!(duration_ms = report.metrics.total_duration_ms, "Installation finished");
    Ok(())
}
