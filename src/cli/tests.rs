//! Unit tests for t2ctl commands

use crate::cli::{run_cli, Cli, Commands};
use clap::Parser;

fn run(args: &[&str]) -> (bool, String) {
    let cli = Cli::try_parse_from(args).unwrap();
    let mut out = Vec::new();
    let found = run_cli(cli, &mut out).unwrap();
    (found, String::from_utf8(out).unwrap())
}

#[test]
fn test_all_commands_parse() {
    let commands = vec![
        vec!["t2ctl", "check-path", "/a/b"],
        vec!["t2ctl", "candidates", "/blog/post", "--config", "t2.yaml"],
        vec!["t2ctl", "probe", "/blog/post", "--app-root", "app"],
        vec!["t2ctl", "--json", "--log", "debug", "check-path", "/"],
    ];

    for args in commands {
        let cli = Cli::try_parse_from(&args);
        assert!(cli.is_ok(), "Failed to parse command: {:?}", args);
    }
}

#[test]
fn test_probe_requires_app_root() {
    assert!(Cli::try_parse_from(["t2ctl", "probe", "/blog"]).is_err());
}

#[test]
fn test_check_path_reports_unsafe() {
    let (ok, out) = run(&["t2ctl", "check-path", "/a/%2e%2e/b"]);
    assert!(!ok);
    assert!(out.contains("decoded: /a/../b"));
    assert!(out.contains("unsafe:  true"));

    let (ok, _) = run(&["t2ctl", "check-path", "/blog/post"]);
    assert!(ok);
}

#[test]
fn test_candidates_lists_both_attempts() {
    let (_, out) = run(&["t2ctl", "candidates", "/blog/post"]);
    let lines: Vec<&str> = out.lines().map(str::trim).collect();
    let index_at = lines.iter().position(|l| *l == "action index:").unwrap();
    assert_eq!(lines[index_at + 1], "app\\controller\\blog\\post");
    assert!(lines.contains(&"action post:"));
    assert!(lines.contains(&"app\\controller\\blog"));
}

#[test]
fn test_probe_finds_controller_file() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("Blog/controller")).unwrap();
    std::fs::write(tmp.path().join("Blog/controller/Post.rs"), "").unwrap();
    let root = tmp.path().to_str().unwrap();

    let (ok, out) = run(&["t2ctl", "probe", "/blog/post/show", "--app-root", root]);
    assert!(ok);
    assert!(out.contains("class:  app\\blog\\controller\\post"));
    assert!(out.contains("action: show"));

    let (ok, _) = run(&["t2ctl", "probe", "/nothing/here", "--app-root", root]);
    assert!(!ok);
}

#[test]
fn test_command_variant() {
    let cli = Cli::try_parse_from(["t2ctl", "check-path", "/x"]).unwrap();
    match cli.command {
        Commands::CheckPath { path } => assert_eq!(path, "/x"),
        _ => panic!("Expected CheckPath command"),
    }
}
