use cbir::Opts;
use cbir::cli::SubCommandExtend;
use cbir::config::SubCommand;
use clap::Parser;
use log::debug;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    let threads = opts.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
    debug!("rayon 线程数: {}", threads);

    match &opts.subcmd {
        SubCommand::Build(cmd) => cmd.run(&opts).await,
        SubCommand::Add(cmd) => cmd.run(&opts).await,
        SubCommand::Search(cmd) => cmd.run(&opts).await,
        SubCommand::Show(cmd) => cmd.run(&opts).await,
        SubCommand::Server(cmd) => cmd.run(&opts).await,
    }
}
