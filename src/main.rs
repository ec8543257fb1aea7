use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use log::info;
use pacbridge::{
    backend::{Backend, LineReporter},
    config::{Config, GroupMap},
    error::{BridgeError, BridgeResult},
    filter::FilterSet,
    snapshot::SnapshotEngine,
    transaction::TransactionFlags,
    PACBRIDGE_VERSION,
};
use std::path::PathBuf;

fn main() {
    env_logger::init();
    let matches = build_cli().get_matches();
    if matches.get_flag("no-color") {
        colored::control::set_override(false);
    }

    if let Err(e) = run_command(&matches) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn filter_arg() -> Arg {
    Arg::new("filter")
        .short('f')
        .long("filter")
        .value_name("FILTERS")
        .default_value("none")
        .help("Filters separated by ';', e.g. installed;~free;newest")
}

fn values_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).required(true).num_args(1..).help(help)
}

fn ids_arg() -> Arg {
    values_arg("ids", "Package ids as name;version;arch;repository")
}

fn transaction_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(ids_arg())
        .arg(Arg::new("transaction-flags")
            .long("transaction-flags")
            .value_name("FLAGS")
            .default_value("none")
            .help("Transaction flags separated by ';'"))
        .arg(Arg::new("simulate")
            .long("simulate")
            .action(ArgAction::SetTrue)
            .help("Only report what would change"))
        .arg(Arg::new("only-trusted")
            .long("only-trusted")
            .action(ArgAction::SetTrue))
}

fn build_cli() -> Command {
    Command::new("pacbridge")
        .version(PACBRIDGE_VERSION)
        .about("PackageKit-style backend over pacman package databases")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("CONFIG")
            .global(true))
        .arg(Arg::new("no-color")
            .long("no-color")
            .action(ArgAction::SetTrue)
            .global(true))
        .subcommand(Command::new("search-name")
            .about("Search package names; every key must match")
            .arg(filter_arg())
            .arg(values_arg("keys", "Name patterns")))
        .subcommand(Command::new("search-details")
            .about("Search names and descriptions; any key may match")
            .arg(filter_arg())
            .arg(values_arg("keys", "Patterns")))
        .subcommand(Command::new("search-group")
            .about("List members of front-end groups")
            .arg(filter_arg())
            .arg(values_arg("groups", "Front-end group names")))
        .subcommand(Command::new("search-file")
            .about("Find installed packages owning matching files")
            .arg(filter_arg())
            .arg(values_arg("files", "File patterns")))
        .subcommand(Command::new("get-packages")
            .about("List every package")
            .arg(filter_arg()))
        .subcommand(Command::new("resolve")
            .about("Resolve package names")
            .arg(filter_arg())
            .arg(values_arg("names", "Package names")))
        .subcommand(Command::new("depends-on")
            .about("List dependencies")
            .arg(filter_arg())
            .arg(ids_arg())
            .arg(Arg::new("recursive")
                .short('r')
                .long("recursive")
                .action(ArgAction::SetTrue)))
        .subcommand(Command::new("required-by")
            .about("List installed reverse dependencies")
            .arg(filter_arg())
            .arg(ids_arg())
            .arg(Arg::new("recursive")
                .short('r')
                .long("recursive")
                .action(ArgAction::SetTrue)))
        .subcommand(Command::new("what-provides")
            .about("Find packages providing every value")
            .arg(filter_arg())
            .arg(values_arg("values", "Provided names")))
        .subcommand(Command::new("get-details")
            .about("Show package details")
            .arg(ids_arg()))
        .subcommand(Command::new("get-files")
            .about("List files of installed packages")
            .arg(ids_arg()))
        .subcommand(Command::new("get-updates")
            .about("List available updates")
            .arg(filter_arg()))
        .subcommand(Command::new("get-update-detail")
            .about("Describe available updates")
            .arg(ids_arg()))
        .subcommand(Command::new("refresh-cache")
            .about("Synchronize the sync databases")
            .arg(Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)))
        .subcommand(transaction_command("install-packages", "Install packages"))
        .subcommand(transaction_command("remove-packages", "Remove packages")
            .arg(Arg::new("allow-deps")
                .long("allow-deps")
                .action(ArgAction::SetTrue)
                .help("Also remove dependencies left orphaned"))
            .arg(Arg::new("autoremove")
                .long("autoremove")
                .action(ArgAction::SetTrue)))
        .subcommand(transaction_command("update-packages", "Update packages"))
        .subcommand(Command::new("download-packages")
            .about("Download package archives")
            .arg(ids_arg())
            .arg(Arg::new("directory")
                .short('d')
                .long("directory")
                .value_name("DIR")
                .help("Destination, defaults to the current directory")))
        .subcommand(Command::new("repo-enable")
            .about("Enable or disable a repository")
            .arg(Arg::new("repo").required(true))
            .arg(Arg::new("enabled")
                .required(true)
                .value_parser(clap::value_parser!(bool))))
        .subcommand(Command::new("get-repo-list")
            .about("List sync repositories"))
}

fn values(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|v| v.cloned().collect())
        .unwrap_or_default()
}

fn flag(matches: &ArgMatches, id: &str) -> bool {
    matches
        .try_get_one::<bool>(id)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false)
}

fn filters(matches: &ArgMatches) -> BridgeResult<FilterSet> {
    matches
        .get_one::<String>("filter")
        .map(String::as_str)
        .unwrap_or("none")
        .parse()
}

fn transaction_flags(matches: &ArgMatches) -> BridgeResult<TransactionFlags> {
    let mut flags: TransactionFlags = matches
        .get_one::<String>("transaction-flags")
        .map(String::as_str)
        .unwrap_or("none")
        .parse()?;
    flags.simulate |= flag(matches, "simulate");
    flags.only_trusted |= flag(matches, "only-trusted");
    Ok(flags
        .with_allow_deps(flag(matches, "allow-deps"))
        .with_autoremove(flag(matches, "autoremove")))
}

fn run_command(matches: &ArgMatches) -> BridgeResult<()> {
    let config = Config::load(matches.get_one::<String>("config").map(String::as_str))?;
    let groups = GroupMap::load(&config.groups_file)?;
    let engine = SnapshotEngine::from_config(&config);
    info!(
        "Using databases in {} ({} sync repositories)",
        config.database_dir.display(),
        config.repositories.len()
    );
    let mut backend = Backend::new(engine, LineReporter::new(std::io::stdout()), config, groups)?;

    match matches.subcommand() {
        Some(("search-name", m)) => backend.search_name(&filters(m)?, &values(m, "keys")),
        Some(("search-details", m)) => backend.search_details(&filters(m)?, &values(m, "keys")),
        Some(("search-group", m)) => backend.search_group(&filters(m)?, &values(m, "groups")),
        Some(("search-file", m)) => backend.search_file(&filters(m)?, &values(m, "files")),
        Some(("get-packages", m)) => backend.get_packages(&filters(m)?),
        Some(("resolve", m)) => backend.resolve(&filters(m)?, &values(m, "names")),
        Some(("depends-on", m)) => {
            backend.depends_on(&filters(m)?, &values(m, "ids"), flag(m, "recursive"))
        }
        Some(("required-by", m)) => {
            backend.required_by(&filters(m)?, &values(m, "ids"), flag(m, "recursive"))
        }
        Some(("what-provides", m)) => backend.what_provides(&filters(m)?, &values(m, "values")),
        Some(("get-details", m)) => backend.get_details(&values(m, "ids")),
        Some(("get-files", m)) => backend.get_files(&values(m, "ids")),
        Some(("get-updates", m)) => backend.get_updates(&filters(m)?),
        Some(("get-update-detail", m)) => backend.get_update_detail(&values(m, "ids")),
        Some(("refresh-cache", m)) => backend.refresh_cache(flag(m, "force")),
        Some(("install-packages", m)) => {
            backend.install_packages(transaction_flags(m)?, &values(m, "ids"))
        }
        Some(("remove-packages", m)) => {
            backend.remove_packages(transaction_flags(m)?, &values(m, "ids"))
        }
        Some(("update-packages", m)) => {
            backend.update_packages(transaction_flags(m)?, &values(m, "ids"))
        }
        Some(("download-packages", m)) => {
            let directory = m.get_one::<String>("directory").map(PathBuf::from);
            backend.download_packages(directory, &values(m, "ids"))
        }
        Some(("repo-enable", m)) => {
            let repo = m
                .get_one::<String>("repo")
                .ok_or_else(|| BridgeError::InvalidInput("missing repository".into()))?;
            let enabled = m.get_one::<bool>("enabled").copied().unwrap_or(true);
            backend.repo_enable(repo, enabled)
        }
        Some(("get-repo-list", _)) => backend.get_repo_list(),
        _ => Err(BridgeError::InvalidInput("unknown command".into())),
    }
}
