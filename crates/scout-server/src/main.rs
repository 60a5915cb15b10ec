use clap::Parser;
use scout_config::ConfigLoader;
use scout_manage::Manage;
use tracing::info;

mod signal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scout video surveillance server")]
struct Args {
    /// 配置目录，里面放 manage.yaml 和各子配置
    #[arg(short, long, default_value = ".config")]
    config_dir: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scout_logging::init();

    let args = Args::parse();
    info!(config_dir = %args.config_dir, "starting scout");

    let loader = ConfigLoader::new(&args.config_dir);
    let mut manage = Manage::new(loader)?;
    info!(data = %manage.data_directory().display(), "monitors configured");
    manage.start();

    let received = signal::wait_for_shutdown().await;
    info!(signal = ?received, "shutting down");

    manage.stop();
    manage.wait().await;
    info!("scout stopped");
    Ok(())
}
