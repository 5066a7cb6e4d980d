use branchstack::cli::Cli;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let code = cli.run()?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
