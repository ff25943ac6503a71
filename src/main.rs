use clap::{arg,crate_version,Command};
use carman::archive;
use std::path::Path;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const RCH: &str = "unreachable was reached";

fn main() -> STDRESULT
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let long_help =
"Examples:
---------
Add:           `carman add my_archive notes.txt data.bin`
List:          `carman list my_archive`
Extract:       `carman extract my_archive \"*.txt\" -C out_dir`
Print:         `carman print my_archive notes.txt > notes_copy.txt`

The archive gets a `.car` extension if it has none and cannot be found as given.
Member names may use `*` and `?` wildcards, except when adding.";

    let commands = [
        ("add","a","add files to an archive, replacing members of the same name",archive::Command::Add),
        ("extract","x","extract members into the working directory",archive::Command::Extract),
        ("replace","r","replace members with files from the working directory",archive::Command::Replace),
        ("delete","d","delete members from an archive",archive::Command::Delete),
        ("print","p","expand members to standard output",archive::Command::Print),
        ("list","l","list the members of an archive",archive::Command::List),
        ("test","t","check the integrity of members",archive::Command::Test)
    ];

    let mut main_cmd = Command::new("carman")
        .about("Compressed ARchive MANager")
        .after_long_help(long_help)
        .version(crate_version!())
        .subcommand_required(true);
    for (name,alias,about,_) in commands.iter() {
        main_cmd = main_cmd.subcommand(Command::new(*name)
            .visible_alias(*alias)
            .arg(arg!(<ARCHIVE> "path to the archive"))
            .arg(arg!([FILES] ... "files to add, or member names to act on (default all)"))
            .arg(arg!(-C --dir <PATH> "working directory for extracted and replacement files").default_value("."))
            .about(*about));
    }

    let matches = main_cmd.get_matches();

    let (name,cmd) = matches.subcommand().expect(RCH);
    let command = commands.iter().find(|c| c.0==name).map(|c| c.3).expect(RCH);
    let car_path = cmd.get_one::<String>("ARCHIVE").expect(RCH);
    let names: Vec<String> = match cmd.get_many::<String>("FILES") {
        Some(vals) => vals.cloned().collect(),
        None => Vec::new()
    };
    let work_dir = cmd.get_one::<String>("dir").expect(RCH);

    eprintln!("CARMAN {} : {}",crate_version!(),command.describe());
    let count = match command {
        archive::Command::Print => archive::run(Path::new(car_path),command,&names,Path::new(work_dir),
            &carman::STD_OPTIONS,&mut std::io::stderr(),&mut std::io::stdout().lock())?,
        _ => archive::run(Path::new(car_path),command,&names,Path::new(work_dir),
            &carman::STD_OPTIONS,&mut std::io::stdout().lock(),&mut std::io::sink())?
    };
    let summary = format!("\n{} file{}",count,if count==1 { "" } else { "s" });
    match command {
        archive::Command::Print => eprintln!("{}",summary),
        _ => println!("{}",summary)
    }
    Ok(())
}
