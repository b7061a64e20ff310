fn main() -> anyhow::Result<()> {
    anteroom::cli::run_cli()
}
