use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use split_compat::cluster::ClusterTree;
use split_compat::compare::{compare, Comparison};
use split_compat::diagnostics::Diagnostics;
use split_compat::io::{
    build_store, read_newick_store, read_split_records, read_taxa, universe_from_records,
    write_comparisons, write_splits, write_tree, SplitRecord,
};
use split_compat::store::{Orientation, SplitStore};
use split_compat::taxa::{Membership, TaxonUniverse};
use split_compat::SplitError;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Build cluster trees from weighted splits and compare split collections.
#[derive(Parser, Debug)]
#[command(name = "split-compat", version, about = "Weighted split compatibility and comparison")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a tree from a split list (strict by default, greedy with --greedy)
    Tree(TreeArgs),
    /// Compare one or more donor split lists against a reference
    Compare(CompareArgs),
    /// Convert a Newick tree into a split list weighted by branch lengths
    Newick2splits(NewickArgs),
}

#[derive(Args, Debug)]
struct TreeArgs {
    /// Split list: weight<TAB>label<TAB>label...
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Taxa list; without it the universe is every label of the input
    #[arg(short = 't', long = "taxa")]
    taxa: Option<PathBuf>,

    /// Skip incompatible splits by descending weight instead of failing
    #[arg(short = 'g', long = "greedy", default_value_t = false)]
    greedy: bool,

    /// Write the splits accepted by the greedy builder to this path
    #[arg(long = "accepted", requires = "greedy")]
    accepted: Option<PathBuf>,

    /// Drop labels missing from the taxa list instead of failing
    #[arg(long = "lenient", default_value_t = false)]
    lenient: bool,

    /// Output path for the tree ("-" for stdout)
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Donor split lists
    #[arg(required = true)]
    donors: Vec<PathBuf>,

    /// Reference split list
    #[arg(short = 'r', long = "reference")]
    reference: PathBuf,

    /// Taxa list; without it the universe is every label of all inputs
    #[arg(short = 't', long = "taxa")]
    taxa: Option<PathBuf>,

    /// Print weighted metrics instead of unweighted ones
    #[arg(short = 'w', long = "weighted", default_value_t = false)]
    weighted: bool,

    /// Print one row per donor prefix instead of the summary only
    #[arg(short = 'a', long = "all-rows", default_value_t = false)]
    all_rows: bool,

    /// Keep only the k heaviest splits of every input
    #[arg(long = "top")]
    top: Option<usize>,

    /// Added to the weight of every split line read; the sum must stay non-negative
    #[arg(long = "add-weight", default_value_t = 0.0, allow_negative_numbers = true)]
    add_weight: f64,

    /// Remove trivial (leaf) splits before comparing
    #[arg(long = "ignore-trivial", default_value_t = false)]
    ignore_trivial: bool,

    /// Drop labels missing from the taxa list instead of failing
    #[arg(long = "lenient", default_value_t = false)]
    lenient: bool,

    /// Output path for the comparison table ("-" for stdout)
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct NewickArgs {
    /// Newick file; only the first tree is used
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Restrict the splits to the taxa of this list
    #[arg(short = 't', long = "taxa")]
    taxa: Option<PathBuf>,

    /// Drop leaves missing from the taxa list instead of failing
    #[arg(long = "lenient", default_value_t = false)]
    lenient: bool,

    /// Output path for the split list ("-" for stdout)
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,
}

/// Exit codes
const EXIT_INPUT: i32 = 2;
const EXIT_BUILD: i32 = 3;
const EXIT_WRITE: i32 = 4;

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Tree(args) => run_tree(args),
        Command::Compare(args) => run_compare(args),
        Command::Newick2splits(args) => run_newick(args),
    }
}

fn run_tree(args: TreeArgs) {
    let t0 = Instant::now();
    let records = or_exit(read_split_records(&args.input, 0.0), EXIT_INPUT, &args.input);
    let universe = match &args.taxa {
        Some(path) => or_exit(read_taxa(path), EXIT_INPUT, path),
        None => universe_from_records(&records),
    };
    let mut diag = Diagnostics::new();
    let store = or_exit(
        build_store(&records, &universe, Orientation::Oriented, membership(args.lenient), &mut diag),
        EXIT_INPUT,
        &args.input,
    );
    info!(
        "Read {} splits over {} taxa in {:.3}s",
        store.len(),
        universe.size(),
        t0.elapsed().as_secs_f64()
    );

    let t1 = Instant::now();
    let tree = if args.greedy {
        let (tree, outcome) = or_exit(
            ClusterTree::build_greedy(&store, &universe, &mut diag),
            EXIT_BUILD,
            &args.input,
        );
        if let Some(path) = &args.accepted {
            or_exit(write_splits(path, &outcome.accepted, &universe), EXIT_WRITE, path);
        }
        tree
    } else {
        or_exit(ClusterTree::build_strict(&store, &universe, &mut diag), EXIT_BUILD, &args.input)
    };
    let newick = or_exit(tree.serialize(&universe), EXIT_BUILD, &args.input);
    info!("Building tree {:.3}s", t1.elapsed().as_secs_f64());

    let t2 = Instant::now();
    or_exit(write_tree(&args.output, &newick), EXIT_WRITE, &args.output);
    log_write_done(&args.output, t2.elapsed().as_secs_f64());
    log_diagnostics(&diag);
}

fn run_compare(args: CompareArgs) {
    let t0 = Instant::now();
    let reference_records = or_exit(
        read_split_records(&args.reference, args.add_weight),
        EXIT_INPUT,
        &args.reference,
    );
    let donor_records: Vec<Vec<SplitRecord>> = args
        .donors
        .par_iter()
        .map(|path| read_split_records(path, args.add_weight))
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| fail(e, EXIT_INPUT, "donor split lists"));

    let universe = match &args.taxa {
        Some(path) => or_exit(read_taxa(path), EXIT_INPUT, path),
        None => {
            let all: Vec<SplitRecord> = std::iter::once(&reference_records)
                .chain(&donor_records)
                .flatten()
                .cloned()
                .collect();
            universe_from_records(&all)
        }
    };
    let membership = membership(args.lenient);

    let mut diag = Diagnostics::new();
    let mut reference = or_exit(
        build_store(&reference_records, &universe, Orientation::Canonical, membership, &mut diag),
        EXIT_INPUT,
        &args.reference,
    );
    prepare(&mut reference, &universe, &args);
    info!(
        "Read reference with {} splits and {} donors over {} taxa in {:.3}s",
        reference.len(),
        args.donors.len(),
        universe.size(),
        t0.elapsed().as_secs_f64()
    );

    let t1 = Instant::now();
    let outcomes: Vec<(String, Comparison, Diagnostics)> = args
        .donors
        .par_iter()
        .zip(donor_records.par_iter())
        .map(|(path, records)| -> Result<_, SplitError> {
            let mut donor_diag = Diagnostics::new();
            let mut donor =
                build_store(records, &universe, Orientation::Canonical, membership, &mut donor_diag)?;
            prepare(&mut donor, &universe, &args);
            let comparison = compare(&donor, &reference);
            Ok((path.display().to_string(), comparison, donor_diag))
        })
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| fail(e, EXIT_BUILD, "donor comparison"));
    info!(
        "Comparing {} donors {:.3}s",
        outcomes.len(),
        t1.elapsed().as_secs_f64()
    );

    let mut results = Vec::with_capacity(outcomes.len());
    for (name, comparison, donor_diag) in outcomes {
        diag.absorb(&donor_diag);
        results.push((name, comparison));
    }

    let t2 = Instant::now();
    or_exit(
        write_comparisons(&args.output, &results, args.weighted, args.all_rows),
        EXIT_WRITE,
        &args.output,
    );
    log_write_done(&args.output, t2.elapsed().as_secs_f64());
    log_diagnostics(&diag);
}

fn run_newick(args: NewickArgs) {
    let t0 = Instant::now();
    let universe: Option<TaxonUniverse> = args
        .taxa
        .as_ref()
        .map(|path| or_exit(read_taxa(path), EXIT_INPUT, path));
    let mut diag = Diagnostics::new();
    let (universe, store) = or_exit(
        read_newick_store(&args.input, universe, membership(args.lenient), &mut diag),
        EXIT_INPUT,
        &args.input,
    );
    info!("Reading Newick tree {:.3}s", t0.elapsed().as_secs_f64());

    let t1 = Instant::now();
    let splits: Vec<_> = store.iter().map(|(s, w)| (s.clone(), w)).collect();
    or_exit(write_splits(&args.output, &splits, &universe), EXIT_WRITE, &args.output);
    log_write_done(&args.output, t1.elapsed().as_secs_f64());
    log_diagnostics(&diag);
}

/// Pre-filters applied to every store before comparing.
fn prepare(store: &mut SplitStore, universe: &TaxonUniverse, args: &CompareArgs) {
    if args.ignore_trivial {
        store.remove_trivial(universe.size());
    }
    if let Some(k) = args.top {
        store.truncate_top_k(k);
    }
}

fn membership(lenient: bool) -> Membership {
    if lenient { Membership::Lenient } else { Membership::Strict }
}

fn or_exit<T, E: Display>(result: Result<T, E>, code: i32, path: &Path) -> T {
    result.unwrap_or_else(|e| fail(e, code, &path.display().to_string()))
}

fn fail<E: Display>(e: E, code: i32, context: &str) -> ! {
    error!("{context}: {e}");
    std::process::exit(code);
}

fn log_write_done(output: &Path, secs: f64) {
    let is_stdout = output.as_os_str() == "-";
    if is_stdout {
        info!("Writing to stdout {secs:.3}s");
    } else {
        info!("Writing to output {secs:.3}s");
    }
}

fn log_diagnostics(diag: &Diagnostics) {
    if *diag != Diagnostics::default() {
        warn!("{diag}");
    }
}
