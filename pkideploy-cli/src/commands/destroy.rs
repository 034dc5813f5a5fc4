use crate::cli::{GlobalFlags, parse_override, parse_subsystem};
use anyhow::Context;
use clap::Args;
use pkideploy::params::DeployMode;
use pkideploy::{DestroyRequest, Deployer, Subsystem, util};

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Subsystem to remove (CA, KRA, OCSP, TKS, TPS)
    #[arg(short, long, value_parser = parse_subsystem)]
    pub subsystem: Subsystem,

    /// Instance the subsystem belongs to
    #[arg(short, long = "instance", default_value = "pki-tomcat")]
    pub instance: String,

    /// Also remove the subsystem and instance log trees
    #[arg(long)]
    pub remove_logs: bool,

    /// Override a parameter of the subsystem section (key=value, repeatable)
    #[arg(short = 'o', long = "set", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,
}

pub async fn execute(args: DestroyArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let (_log_guard, log_file) = util::init_logging(
        &global.log_dir,
        args.subsystem,
        DeployMode::Destroy,
        global.env_filter(),
    )
    .context("Uninstallation failed: cannot open log file")?;

    tracing::info!(
        subsystem = %args.subsystem,
        instance = %args.instance,
        log = %log_file.display(),
        "Starting uninstallation"
    );
    let request = DestroyRequest {
        default_config: global.default_config(),
        subsystem: args.subsystem,
        instance_name: args.instance.clone(),
        overrides: args.overrides,
        remove_logs: args.remove_logs,
    };

    let report = match Deployer::default().destroy(request).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Uninstallation failed");
            eprintln!("Uninstallation log: {}", log_file.display());
            return Err(e).context(format!(
                "Uninstallation failed for {} in instance '{}'",
                args.subsystem, args.instance
            ));
        }
    };

    println!(
        "Removed {} from instance '{}' ({} recorded objects)",
        args.subsystem, report.instance_name, report.records
    );
    println!("Uninstallation log: {}", log_file.display());
    Ok(())
}
