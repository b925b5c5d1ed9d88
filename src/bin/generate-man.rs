// Writes the lotflow man page to the directory given as the first argument (default: man)

use clap::CommandFactory;
use lotflow::cli::Cli;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    std::fs::create_dir_all(&out_dir)?;

    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd.clone());
    let mut buffer: Vec<u8> = Vec::new();
    man.render(&mut buffer)?;
    let path = out_dir.join("lotflow.1");
    std::fs::write(&path, buffer)?;
    println!("Wrote {}", path.display());

    for sub in cmd.get_subcommands() {
        let name = format!("lotflow-{}", sub.get_name());
        let man = clap_mangen::Man::new(sub.clone());
        let mut buffer: Vec<u8> = Vec::new();
        man.render(&mut buffer)?;
        let path = out_dir.join(format!("{}.1", name));
        std::fs::write(&path, buffer)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
