fn main() -> anyhow::Result<()> {
    modset::run()?;
    Ok(())
}
