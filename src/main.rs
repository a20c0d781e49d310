fn main() -> anyhow::Result<()> {
    speakez_lib::run()
}
