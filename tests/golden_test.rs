//! Whole-program tests: each `.bas` file under `tests/bas` carries its
//! expected output in `'EXPECT` comment lines.

mod common;
use common::run;
use std::fs;

fn expected(source: &str) -> String {
    let mut out = String::new();
    for line in source.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("'EXPECT ") {
            out.push_str(rest);
            out.push('\n');
        } else if line == "'EXPECT" {
            out.push('\n');
        }
    }
    out
}

#[test]
fn test_programs_match_their_expectations() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/bas");
    let mut checked = 0;
    let mut entries: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    entries.sort();
    for path in entries {
        if path.extension().map(|ext| ext == "bas").unwrap_or(false) {
            let source = fs::read_to_string(&path).unwrap();
            assert_eq!(run(&source), expected(&source), "{}", path.display());
            checked += 1;
        }
    }
    assert!(checked > 0);
}
