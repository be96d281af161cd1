use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use taxlca_rs::config::{parse_column_names, CountConfig, LcaConfig, DEFAULT_HIT_COLUMNS};
use taxlca_rs::taxdb::TaxDb;
use taxlca_rs::{assign_lca, count_taxa};

#[derive(Parser, Debug)]
#[clap(author, version, about = "LCA taxonomy assignment and clade counts for BLAST/DIAMOND hits")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assign each query to the lowest common ancestor of its best hits
    Lca(LcaArgs),
    /// Sum query counts onto every ancestor of their LCA taxa
    Counts(CountArgs),
}

/// Where taxonomy comes from: a taxDB file, or an NCBI taxdump pair.
#[derive(Args, Debug)]
struct TaxonomyArgs {
    /// taxDB file: taxid<TAB>parent<TAB>name<TAB>rank
    #[arg(long, conflicts_with_all = ["nodes", "names"])]
    taxdb: Option<PathBuf>,

    /// NCBI nodes.dmp
    #[arg(long, requires = "names")]
    nodes: Option<PathBuf>,

    /// NCBI names.dmp
    #[arg(long, requires = "nodes")]
    names: Option<PathBuf>,
}

impl TaxonomyArgs {
    fn load(&self) -> Result<TaxDb, Box<dyn Error>> {
        let taxonomy = match (&self.taxdb, &self.nodes, &self.names) {
            (Some(taxdb), _, _) => TaxDb::from_taxdb_file(taxdb)?,
            (None, Some(nodes), Some(names)) => TaxDb::from_ncbi_dump(nodes, names)?,
            _ => return Err("either --taxdb or both --nodes and --names are required".into()),
        };
        Ok(taxonomy)
    }
}

#[derive(Args, Debug)]
struct LcaArgs {
    /// BLAST or DIAMOND tabular output; first column is the query id (.gz accepted)
    #[arg(short, long)]
    infile: PathBuf,

    /// Output table (tab-delimited)
    #[arg(short, long)]
    outfile: PathBuf,

    /// Space-delimited column names of the input
    #[arg(short, long, default_value = DEFAULT_HIT_COLUMNS)]
    column_names: String,

    /// Read the column names from the first line instead of --column-names
    #[arg(long, default_value_t = false)]
    header: bool,

    /// Column holding the query id
    #[arg(short = 'q', long, default_value = "query_ID")]
    query_column: String,

    /// Column holding the taxon id
    #[arg(short = 't', long, default_value = "taxonID")]
    taxonomy_column: String,

    /// Column holding the score to filter by
    #[arg(short, long, default_value = "bitscore")]
    score_column: String,

    /// Taxa to ignore: one per line, optionally followed by tab-separated fields
    #[arg(short, long)]
    blacklist: Option<PathBuf>,

    /// Keep hits within this percentage of the query's top score
    #[arg(short, long, default_value_t = 1.0)]
    within_percentage_of_top_score: f64,

    #[clap(flatten)]
    taxonomy: TaxonomyArgs,
}

#[derive(Args, Debug)]
struct CountArgs {
    /// LCA table produced by the `lca` subcommand
    #[arg(short, long)]
    infile: PathBuf,

    /// Output count table (tab-delimited)
    #[arg(short, long)]
    outfile: PathBuf,

    /// query_id<TAB>count file; without it every query counts once
    #[arg(short, long)]
    counts_file: Option<PathBuf>,

    #[clap(flatten)]
    taxonomy: TaxonomyArgs,
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{}}} {{msg}}", color);
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

fn write_output(path: &Path, contents: String) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, contents)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn run_lca(args: LcaArgs) -> Result<(), Box<dyn Error>> {
    let sp = spinner("blue", "Loading taxonomy...");
    let taxonomy = args.taxonomy.load()?;
    sp.finish_with_message(format!("Loaded {} taxa.", taxonomy.len()));

    let config = LcaConfig {
        column_names: (!args.header).then(|| parse_column_names(&args.column_names)),
        query_column: args.query_column,
        taxon_column: args.taxonomy_column,
        score_column: args.score_column,
        within_percent_of_top: args.within_percentage_of_top_score,
        blacklist: args.blacklist,
        ..LcaConfig::default()
    };

    let sp = spinner("green", "Resolving LCAs...");
    let results = assign_lca(&args.infile, &taxonomy, &config)?;
    sp.finish_with_message(format!(
        "Assigned {} queries, {} without surviving hits, {} lineage corrections.",
        results.query_results.len(),
        results.skipped_queries.len(),
        results.drift_corrections
    ));

    write_output(&args.outfile, results.get_lca_table())
}

fn run_counts(args: CountArgs) -> Result<(), Box<dyn Error>> {
    let sp = spinner("blue", "Loading taxonomy...");
    let taxonomy = args.taxonomy.load()?;
    sp.finish_with_message(format!("Loaded {} taxa.", taxonomy.len()));

    let config = CountConfig {
        counts: args.counts_file,
        ..CountConfig::default()
    };

    let sp = spinner("yellow", "Aggregating counts...");
    let results = count_taxa(&args.infile, &taxonomy, &config)?;
    sp.finish_with_message(format!("Counted {} taxa.", results.rows.len()));

    write_output(&args.outfile, results.get_count_table())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Lca(args) => run_lca(args)?,
        Command::Counts(args) => run_counts(args)?,
    }

    log::info!("Finished.");
    Ok(())
}
