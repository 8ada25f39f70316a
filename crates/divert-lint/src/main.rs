//! Divert rule snapshot linter CLI.
//!
//! Usage:
//!   divert-lint <directory_or_file> [OPTIONS]

use clap::{Parser, ValueEnum};
use divert_lint::{lint_directory, lint_file, LintIssue, LintOptions, LintResult, Severity};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Divert rule snapshot linter
#[derive(Parser, Debug)]
#[command(name = "divert-lint")]
#[command(author, version, about = "Validate Divert rule snapshots before they are loaded")]
struct Args {
    /// Snapshot file or directory of snapshot files
    #[arg(required = true)]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Only show errors (hide warnings and notes)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Show where each rule will be enforced
    #[arg(short = 'x', long)]
    explain: bool,

    /// Treat warnings as errors
    #[arg(short, long)]
    strict: bool,
}

fn main() {
    let args = Args::parse();
    let options = LintOptions {
        strict: args.strict,
        explain: args.explain,
    };

    let result = if args.path.is_dir() {
        lint_directory(&args.path, &options)
    } else {
        lint_file(&args.path, &options)
    };

    match args.output {
        OutputFormat::Json => print_results_json(&result),
        OutputFormat::Text => print_results(&result, &args),
    }

    let code = if result.passes(options.strict) { 0 } else { 1 };
    std::process::exit(code);
}

fn print_results_json(result: &LintResult) {
    match serde_json::to_string_pretty(result) {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("{RED}Failed to render results: {e}{RESET}"),
    }
}

fn visible(issue: &LintIssue, args: &Args) -> bool {
    !args.errors_only || issue.severity == Severity::Error
}

fn print_results(result: &LintResult, args: &Args) {
    println!("{BOLD}{CYAN}Divert Rule Linter{RESET}");
    println!("{DIM}{RULE}{RESET}");
    println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}\n", args.path.display());

    let mut by_file: BTreeMap<&Path, Vec<&LintIssue>> = BTreeMap::new();
    for issue in result.issues.iter().filter(|i| visible(i, args)) {
        by_file.entry(issue.file.as_path()).or_default().push(issue);
    }

    if by_file.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    }

    for (file, issues) in &by_file {
        let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
        let warnings = issues.iter().filter(|i| i.severity == Severity::Warning).count();
        let file_name = file.file_name().unwrap_or_default().to_string_lossy();

        let status = if errors > 0 {
            format!("{RED}FAIL{RESET}")
        } else if warnings > 0 {
            format!("{YELLOW}WARN{RESET}")
        } else {
            format!("{CYAN}NOTE{RESET}")
        };
        println!(
            "{status} {BOLD}{CYAN}{file_name}{RESET} {DIM}({errors} error(s), {warnings} warning(s)){RESET}"
        );

        for issue in issues {
            print_issue(issue);
        }
        println!();
    }

    println!("{DIM}{RULE}{RESET}");
    println!("{BOLD}{CYAN}Summary{RESET}");
    println!("{DIM}{RULE}{RESET}");
    println!("  {DIM}Files checked:{RESET} {BOLD}{}{RESET}", result.files_checked);
    println!("  {DIM}Rules checked:{RESET} {BOLD}{}{RESET}", result.rules_checked);

    if result.errors > 0 {
        println!("  {RED}Errors:{RESET}    {BOLD}{RED}{}{RESET}", result.errors);
    } else {
        println!("  {GREEN}Errors:{RESET}    {BOLD}{GREEN}0{RESET}");
    }
    if result.warnings > 0 {
        println!("  {YELLOW}Warnings:{RESET}  {BOLD}{YELLOW}{}{RESET}", result.warnings);
    } else {
        println!("  {DIM}Warnings:{RESET}  {BOLD}0{RESET}");
    }
    println!();

    if !result.passes(args.strict) {
        println!("{RED}{BOLD}Linting failed{RESET}");
    } else if result.has_warnings() {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    }
}

fn print_issue(issue: &LintIssue) {
    let color = severity_color(issue.severity);
    let marker = format!("{color}|{RESET}");
    let location = issue
        .location
        .as_ref()
        .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
        .unwrap_or_default();

    println!(
        "  {marker} {location}{BOLD}{color}{}{RESET}: {} {DIM}({color}{}{DIM}){RESET}",
        issue.severity.label(),
        issue.message,
        issue.code
    );
    if let Some(suggestion) = &issue.suggestion {
        println!("  {marker}   {GREEN}-> {suggestion}{RESET}");
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}
