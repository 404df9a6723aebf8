//! Command-line entry point: parse a file and print its syntax tree.

use candid_sitter::{candid, parse_grammar, Language, Node, Parser, Tree};
use facet::Facet;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Parse a Candid file and print its syntax tree.
#[derive(Facet, Debug)]
struct Args {
    /// The file to parse.
    #[facet(positional)]
    file: String,

    /// Parse with this `grammar.json` instead of the bundled Candid grammar.
    #[facet(named, short = 'g', default)]
    grammar: Option<String>,

    /// Print a JSON summary instead of an S-expression.
    #[facet(named, short = 'j', default)]
    json: bool,

    /// Print nothing; report syntax errors through the exit code only.
    #[facet(named, short = 'q', default)]
    quiet: bool,

    /// Log compilation and parsing details to stderr.
    #[facet(named, short = 'v', default)]
    verbose: bool,
}

#[derive(Facet, Debug)]
struct Summary {
    file: String,
    language: String,
    root: String,
    start_byte: usize,
    end_byte: usize,
    has_error: bool,
    errors: Vec<ErrorSpan>,
    sexp: String,
}

#[derive(Facet, Debug)]
struct ErrorSpan {
    start_byte: usize,
    end_byte: usize,
    row: usize,
    column: usize,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "candid_sitter=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_language(path: Option<&str>) -> Result<Language, String> {
    let Some(path) = path else {
        return candid::language().map_err(|e| e.to_string());
    };
    let json = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
    let grammar = parse_grammar(&json).map_err(|e| format!("{path}: {e}"))?;
    let compiled = if grammar.external_names().is_empty() {
        Language::new(&grammar)
    } else {
        Language::with_external_scanner(&grammar, candid::scanner)
    };
    compiled.map_err(|e| format!("{path}: {e}"))
}

fn collect_errors(node: &Node<'_>, out: &mut Vec<ErrorSpan>) {
    if node.is_error() {
        let start = node.start_position();
        out.push(ErrorSpan {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            row: start.row,
            column: start.column,
        });
        return;
    }
    if node.has_error() {
        for child in node.children() {
            collect_errors(&child, out);
        }
    }
}

fn summarize(file: &str, tree: &Tree) -> Summary {
    let root = tree.root_node();
    let mut errors = Vec::new();
    collect_errors(&root, &mut errors);
    Summary {
        file: file.to_string(),
        language: tree.language().name().to_string(),
        root: root.kind().to_string(),
        start_byte: root.start_byte(),
        end_byte: root.end_byte(),
        has_error: root.has_error(),
        errors,
        sexp: root.to_sexp(),
    }
}

fn run(args: &Args) -> Result<bool, String> {
    let language = load_language(args.grammar.as_deref())?;
    let source = std::fs::read(&args.file).map_err(|e| format!("{}: {e}", args.file))?;

    let mut parser = Parser::new();
    parser.set_language(&language).map_err(|e| e.to_string())?;
    let tree = parser
        .parse_bytes(&source, None)
        .map_err(|e| format!("{}: {e}", args.file))?;
    let has_error = tree.root_node().has_error();

    if !args.quiet {
        if args.json {
            println!("{}", facet_json::to_string(&summarize(&args.file, &tree)));
        } else {
            println!("{}", tree.root_node().to_sexp());
        }
    }
    Ok(has_error)
}

fn main() -> ExitCode {
    let args: Args = match facet_args::from_std_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(args.verbose);

    match run(&args) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
