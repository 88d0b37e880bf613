use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let params = <tests::Params as structopt::StructOpt>::from_args();
    let comments = tests::generate(&params);
    let json = serde_json::to_string_pretty(&comments).context("serializing comment thread")?;
    println!("{json}");
    Ok(())
}
