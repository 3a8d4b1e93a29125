use std::fs;
use std::path::Path;

use split_compat::io::{
    build_store, read_newick_store, read_split_records, read_taxa, universe_from_records,
    write_comparisons, write_splits, write_tree,
};
use split_compat::{
    compare, ClusterTree, Diagnostics, Membership, Orientation, SplitError, TaxonUniverse,
};

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn strict_tree_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let taxa = write(dir.path(), "taxa.txt", "A.fasta\nB.fasta\nC.fasta\nD.fasta\nE.fasta\nF.fasta\n");
    let splits = write(dir.path(), "splits.tsv", "3\tA\tB\n2\tA\tB\tC\n1\tE\tF\n");

    let universe = read_taxa(&taxa).unwrap();
    assert_eq!(universe.size(), 6);
    let records = read_split_records(&splits, 0.0).unwrap();
    let mut diag = Diagnostics::new();
    let store = build_store(&records, &universe, Orientation::Oriented, Membership::Strict, &mut diag).unwrap();
    let tree = ClusterTree::build_strict(&store, &universe, &mut diag).unwrap();

    let out = dir.path().join("tree.txt");
    write_tree(&out, &tree.serialize(&universe).unwrap()).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "(((A,B),C),D,(E,F));\n");
}

#[test]
fn strict_tree_reports_first_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let splits = write(dir.path(), "splits.tsv", "5\tA\tB\n4\tB\tC\n1\tC\tD\n");
    let records = read_split_records(&splits, 0.0).unwrap();
    let universe = TaxonUniverse::from_labels(["A", "B", "C", "D", "E"]);
    let mut diag = Diagnostics::new();
    let store = build_store(&records, &universe, Orientation::Oriented, Membership::Strict, &mut diag).unwrap();

    match ClusterTree::build_strict(&store, &universe, &mut diag) {
        Err(SplitError::IncompatibleSplit { split, partial_tree }) => {
            assert_eq!(split, "B, C");
            assert_eq!(partial_tree, "((A,B),C,D,E);");
        }
        other => panic!("expected an incompatible split, got {other:?}"),
    }
}

#[test]
fn greedy_accepted_splits_round_trip_through_gzip() {
    let dir = tempfile::tempdir().unwrap();
    let splits = write(dir.path(), "splits.tsv", "5\tA\tB\n3\tC\tD\n1\tA\tC\n");
    let records = read_split_records(&splits, 0.0).unwrap();
    let universe = universe_from_records(&records);
    let mut diag = Diagnostics::new();
    let store = build_store(&records, &universe, Orientation::Oriented, Membership::Strict, &mut diag).unwrap();

    let (tree, outcome) = ClusterTree::build_greedy(&store, &universe, &mut diag).unwrap();
    assert_eq!(outcome.accepted.len(), 2);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(outcome.max_resolved, 5);
    assert_eq!(diag.rejected_splits, 1);
    assert_eq!(tree.serialize(&universe).unwrap(), "((A,B),(C,D));");

    let accepted = dir.path().join("accepted.tsv.gz");
    write_splits(&accepted, &outcome.accepted, &universe).unwrap();
    let back = read_split_records(&accepted, 0.0).unwrap();
    let listed: Vec<(f64, Vec<String>)> = back.into_iter().map(|r| (r.weight, r.labels)).collect();
    assert_eq!(
        listed,
        vec![
            (5.0, vec!["A".to_string(), "B".to_string()]),
            (3.0, vec!["C".to_string(), "D".to_string()]),
        ]
    );
}

#[test]
fn unknown_taxon_strict_vs_lenient() {
    let dir = tempfile::tempdir().unwrap();
    let taxa = write(dir.path(), "taxa.txt", "A\tfirst\nB\nC\nD\nE\n");
    let splits = write(dir.path(), "splits.tsv", "2\tA\tB\tZ\n1\tC\tD\n");
    let universe = read_taxa(&taxa).unwrap();
    let records = read_split_records(&splits, 0.0).unwrap();

    let mut diag = Diagnostics::new();
    let err = build_store(&records, &universe, Orientation::Canonical, Membership::Strict, &mut diag).unwrap_err();
    assert!(matches!(err, SplitError::UnknownTaxon(ref label) if label == "Z"));

    let mut diag = Diagnostics::new();
    let store = build_store(&records, &universe, Orientation::Canonical, Membership::Lenient, &mut diag).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(diag.discarded_taxa, 1);
}

#[test]
fn comparison_table_for_several_donors() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write(dir.path(), "reference.tsv", "2\tA\tB\n1\tC\tD\n");
    let same = write(dir.path(), "same.tsv", "2\tC\tD\tE\n1\tC\tD\n");
    let empty = write(dir.path(), "empty.tsv", "\n");

    let universe = TaxonUniverse::from_labels(["A", "B", "C", "D", "E"]);
    let load = |path: &Path| {
        let records = read_split_records(path, 0.0).unwrap();
        let mut diag = Diagnostics::new();
        build_store(&records, &universe, Orientation::Canonical, Membership::Strict, &mut diag).unwrap()
    };
    let reference = load(&reference);
    let results = vec![
        ("same".to_string(), compare(&load(&same), &reference)),
        ("empty".to_string(), compare(&load(&empty), &reference)),
    ];

    let out = dir.path().join("table.tsv");
    write_comparisons(&out, &results, false, false).unwrap();
    let table = fs::read_to_string(&out).unwrap();
    assert_eq!(
        table,
        "# same\n\
         #precision\trecall\tF1\tsymmetric_distance\tRF_distance\n\
         1\t1\t1\t0\t0\n\
         # empty\n\
         #precision\trecall\tF1\tsymmetric_distance\tRF_distance\n\
         NA\t0\tNA\t1\t2\n"
    );
}

#[test]
fn newick_splits_rebuild_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let newick = write(dir.path(), "tree.nwk", "((A:1,B:1):2,(C:1,D:1):3,E:1);\n");
    let mut diag = Diagnostics::new();
    let (universe, store) = read_newick_store(&newick, None, Membership::Strict, &mut diag).unwrap();

    let splits_path = dir.path().join("splits.tsv");
    let splits: Vec<_> = store.iter().map(|(s, w)| (s.clone(), w)).collect();
    write_splits(&splits_path, &splits, &universe).unwrap();

    let records = read_split_records(&splits_path, 0.0).unwrap();
    let rebuilt = universe_from_records(&records);
    assert_eq!(rebuilt.labels(), universe.labels());
    let oriented = build_store(&records, &rebuilt, Orientation::Oriented, Membership::Strict, &mut diag).unwrap();
    let tree = ClusterTree::build_strict(&oriented, &rebuilt, &mut diag).unwrap();
    assert_eq!(tree.serialize(&rebuilt).unwrap(), "((A,B),(C,D),E);");
    assert_eq!(diag.trivial_splits, 5);
}
