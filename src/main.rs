fn main() -> anyhow::Result<()> {
    annals::cli::run()
}
