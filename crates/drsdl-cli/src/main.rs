mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, CliCommand, CommonArgs, MockArgs, ServiceAArgs, ServiceBArgs};
use drsdl_core::batch::{self, BatchOptions, BatchReport};
use drsdl_core::cancel::CancelToken;
use drsdl_core::provider::{DrsServiceAClient, DrsServiceBClient, MockObjectSpec, MockProvider, ProviderClient};
use drsdl_core::retry::RetryPolicy;
use drsdl_core::{config, logging, manifest};
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        CliCommand::Mock(a) => a.common.verbose,
        CliCommand::ServiceA(a) => a.common.verbose,
        CliCommand::ServiceB(a) => a.common.verbose,
    };
    logging::init_logging(verbose).expect("failed to initialize logging");

    let cancel = CancelToken::new();
    let interrupt_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, cancelling after in-flight transfers finish");
        interrupt_token.cancel();
    }) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler; interrupts will not be caught");
    }

    match run(cli, cancel) {
        Ok(report) => {
            print_report(&report);
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("drsdl error: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli, cancel: CancelToken) -> Result<BatchReport> {
    match cli.command {
        CliCommand::Mock(args) => run_mock(args, cancel),
        CliCommand::ServiceA(args) => run_service_a(args, cancel),
        CliCommand::ServiceB(args) => run_service_b(args, cancel),
    }
}

fn run_mock(args: MockArgs, cancel: CancelToken) -> Result<BatchReport> {
    let provider = MockProvider::new();
    for spec in &args.register {
        let (id, name, size) = parse_register_spec(spec)
            .with_context(|| format!("invalid --register value: {}", spec))?;
        provider.register(id, MockObjectSpec::new(name, size));
    }
    let provider: Arc<dyn ProviderClient> = Arc::new(provider);
    run_with_provider(provider, args.common, cancel)
}

fn run_service_a(args: ServiceAArgs, cancel: CancelToken) -> Result<BatchReport> {
    let provider: Arc<dyn ProviderClient> = Arc::new(DrsServiceAClient::new(args.base_url, args.token));
    run_with_provider(provider, args.common, cancel)
}

fn run_service_b(args: ServiceBArgs, cancel: CancelToken) -> Result<BatchReport> {
    let provider: Arc<dyn ProviderClient> = Arc::new(DrsServiceBClient::new(args.base_url, args.api_key));
    run_with_provider(provider, args.common, cancel)
}

fn run_with_provider(provider: Arc<dyn ProviderClient>, common: CommonArgs, cancel: CancelToken) -> Result<BatchReport> {
    let cfg = match &common.config {
        Some(path) => config::load_from(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load_or_init().context("loading config")?,
    };
    tracing::debug!(?cfg, "loaded config");

    let uris = manifest::read_manifest(&common.manifest, common.column.as_deref())
        .with_context(|| format!("reading manifest {}", common.manifest.display()))?;

    let options = BatchOptions {
        dest_dir: common.dest,
        replace: common.replace,
        billing_project: common.billing_project.or(cfg.billing_project),
        max_retrievers: common.max_retrievers.unwrap_or(cfg.max_retrievers),
        max_signers: common.max_signers.unwrap_or(cfg.max_signers),
        max_downloaders_override: common.max_downloaders,
        part_size_override: common.part_size,
        max_part_handlers_override: common.max_part_handlers,
        retry_policy: RetryPolicy::default(),
        cancel,
    };

    Ok(batch::run_batch(provider, uris, &options))
}

fn parse_register_spec(spec: &str) -> Result<(String, String, u64)> {
    let (id, rest) = spec
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected ID=NAME:SIZE"))?;
    let (name, size) = rest
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("expected ID=NAME:SIZE"))?;
    let size: u64 = size.parse().with_context(|| format!("invalid size {:?}", size))?;
    Ok((id.to_string(), name.to_string(), size))
}

fn print_report(report: &BatchReport) {
    if let Some(reason) = &report.fatal {
        eprintln!("drsdl: {}", reason);
        return;
    }
    for object in &report.objects {
        if object.ok {
            println!("{}\tOK\t{}\t{} parts", object.name, object.size, object.num_parts);
        } else {
            println!(
                "{}\tERROR\t{}\t{} parts\t{}",
                object.name,
                object.size,
                object.num_parts,
                object.errors.join("; ")
            );
        }
    }
    println!(
        "{}/{} succeeded (peak open file descriptors: {})",
        report.succeeded, report.total, report.peak_open_fds
    );
}
