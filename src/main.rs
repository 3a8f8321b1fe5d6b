fn main() -> anyhow::Result<()> {
    orchestrator_cli::main()
}
