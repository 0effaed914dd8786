use clap::Parser;

use pg_typegen::ui::{self, Cli, Colors, Commands, colors};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let colors = Colors::new(colors::colors_enabled(cli.color), colors::detect_theme(cli.theme));

  match cli.command {
    Commands::Generate(command) => {
      let options = ui::commands::RunOptions::from_command(command)?;
      ui::commands::generate_types(&options, &colors).await?;
    }
    Commands::Migrate(command) => {
      ui::commands::migrate_project(command, &colors).await?;
    }
  }

  Ok(())
}
