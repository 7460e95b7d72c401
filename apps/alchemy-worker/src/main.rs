use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = alchemy_worker::Args::parse();
	alchemy_worker::run(args).await
}
