use crate::{
    config::PlatformArgs,
    controller::StackController,
    engines::SomeEngine,
    logging::LoggingConfig,
    web::{self, AppState},
};
use clap::Parser;
use std::{net::SocketAddr, process::ExitCode};

#[derive(Parser)]
#[command(
    about = "Self-service web portal for static websites and virtual machines, provisioned as Pulumi stacks",
    override_usage = color_print::cstr! {r#"<bold>platyform</bold> [OPTIONS] <<ENGINE>> [ENGINE OPTIONS]

Serve the portal, provisioning through the Pulumi CLI:

    PULUMI_ORG=acme platyform pulumi

Try the portal without touching any cloud account:

    platyform --listen 0.0.0.0:8080 memory --apply-delay-ms 2000
"#},
    flatten_help = true,
)]
pub struct Cli {
    /// Address the HTTP server binds to.
    #[arg(long, default_value = "127.0.0.1:5000", global = true)]
    listen: SocketAddr,

    #[command(flatten)]
    engine: SomeEngine,

    #[command(flatten)]
    platform: PlatformArgs,

    #[command(flatten)]
    logging: LoggingConfig,
}

impl Cli {
    pub async fn run(&self) -> ExitCode {
        if let Err(e) = self.logging.init(format!("platyform[{}]: ", std::process::id())) {
            log::warn!("{e:#}");
        }
        match self.serve().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{e:#}");
                ExitCode::FAILURE
            }
        }
    }

    async fn serve(&self) -> anyhow::Result<()> {
        let config = self.platform.to_config();
        log::info!("Managing stacks of project {} in {}", config.project_name, config.region);
        let engine = self.engine.start().await?;
        let controller = StackController::new(config, engine);
        web::serve(self.listen, AppState::new(controller)).await
    }
}
