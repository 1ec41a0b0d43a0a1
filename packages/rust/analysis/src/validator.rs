//! Static per-file checks: Python syntax, script syntax via `node --check`,
//! and HTML document structure.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument, warn};
use tree_sitter::{Node, Parser};

use mvpfactory_shared::{ArtifactSet, ValidationConfig};

const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs"];
const REQUIRED_HTML_TAGS: &[&str] = &["<html", "<head", "<body"];

/// Parses the file named by `argv[1]` and prints `line<TAB>message` on a
/// syntax error. Nothing is written next to the file.
const PYTHON_PARSE: &str = "import ast, sys
try:
    ast.parse(open(sys.argv[1], 'rb').read(), sys.argv[1])
except SyntaxError as e:
    print(f'{e.lineno or 0}\\t{e.msg}')
    sys.exit(1)
";

/// Statements that must be followed by an indented block.
const BLOCK_HEADERS: &[&str] = &[
    "function_definition",
    "class_definition",
    "if_statement",
    "elif_clause",
    "else_clause",
    "for_statement",
    "while_statement",
    "with_statement",
    "try_statement",
    "except_clause",
    "except_group_clause",
    "finally_clause",
    "case_clause",
];

/// Category of a static finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    PythonSyntax,
    ScriptSyntax,
    ScriptTimeout,
    HtmlStructure,
}

impl DiagnosticKind {
    fn label(&self) -> &'static str {
        match self {
            Self::PythonSyntax => "SyntaxError",
            Self::ScriptSyntax => "JS Error",
            Self::ScriptTimeout => "JS Timeout",
            Self::HtmlStructure => "HTML",
        }
    }
}

/// One finding reported by [`StaticValidator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: String,
    /// 1-based line, when the checker can tell.
    pub line: Option<usize>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = self.kind.label();
        match self.line {
            Some(line) => write!(f, "[{}] {label} line {line}: {}", self.path, self.message),
            None => write!(f, "[{}] {label}: {}", self.path, self.message),
        }
    }
}

/// How an external checker run ended.
enum CheckerRun {
    Passed,
    Rejected { stdout: String, stderr: String },
    TimedOut,
    /// Not installed, or it could not be run to completion.
    Unavailable,
}

/// Runs every applicable check over the files of a project tree.
#[derive(Debug, Clone)]
pub struct StaticValidator {
    python_cmd: String,
    node_cmd: String,
    timeout: Duration,
}

impl Default for StaticValidator {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

impl StaticValidator {
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self {
            python_cmd: config.python_cmd.clone(),
            node_cmd: config.node_cmd.clone(),
            timeout: Duration::from_secs(config.node_timeout_secs),
        }
    }

    /// Check every artifact that also exists under `root`.
    ///
    /// Findings never stop the scan; they are returned in path order.
    #[instrument(skip_all, fields(root = %root.display(), files = artifacts.len()))]
    pub async fn check(&self, root: &Path, artifacts: &ArtifactSet) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for (path, content) in artifacts.iter() {
            let full_path = root.join(path);
            if !full_path.is_file() {
                continue;
            }

            if path.ends_with(".py") {
                diagnostics.extend(self.check_python(path, content, &full_path).await);
            } else if SCRIPT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
                diagnostics.extend(self.check_script(path, &full_path).await);
            } else if path.ends_with(".html") {
                diagnostics.extend(check_html(path, content));
            }
        }

        debug!(count = diagnostics.len(), "static checks complete");
        diagnostics
    }

    /// Compile with the Python interpreter; fall back to tree-sitter when
    /// it cannot be run.
    async fn check_python(&self, path: &str, source: &str, full_path: &Path) -> Option<Diagnostic> {
        let args = [OsStr::new("-c"), OsStr::new(PYTHON_PARSE), full_path.as_os_str()];
        match self.run_checker(&self.python_cmd, args).await {
            CheckerRun::Passed => None,
            CheckerRun::Rejected { stdout, stderr } => {
                Some(interpreter_diagnostic(path, &stdout, &stderr))
            }
            CheckerRun::TimedOut | CheckerRun::Unavailable => parse_python(path, source),
        }
    }

    async fn check_script(&self, path: &str, full_path: &Path) -> Option<Diagnostic> {
        let args = [OsStr::new("--check"), full_path.as_os_str()];
        match self.run_checker(&self.node_cmd, args).await {
            CheckerRun::Passed | CheckerRun::Unavailable => None,
            CheckerRun::Rejected { stderr, .. } => Some(Diagnostic {
                path: path.to_string(),
                line: None,
                kind: DiagnosticKind::ScriptSyntax,
                message: stderr.trim().to_string(),
            }),
            CheckerRun::TimedOut => Some(Diagnostic {
                path: path.to_string(),
                line: None,
                kind: DiagnosticKind::ScriptTimeout,
                message: format!("syntax check timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }

    async fn run_checker<I, S>(&self, program: &str, args: I) -> CheckerRun
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(cmd = %program, "checker not installed, skipping");
                return CheckerRun::Unavailable;
            }
            Err(e) => {
                warn!(cmd = %program, error = %e, "failed to spawn checker");
                return CheckerRun::Unavailable;
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(cmd = %program, error = %e, "checker failed to complete");
                return CheckerRun::Unavailable;
            }
            Err(_) => return CheckerRun::TimedOut,
        };

        if output.status.success() {
            CheckerRun::Passed
        } else {
            CheckerRun::Rejected {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        }
    }
}

/// Turn `line<TAB>message` from [`PYTHON_PARSE`] into a diagnostic. Any
/// other failure output is reported as is.
fn interpreter_diagnostic(path: &str, stdout: &str, stderr: &str) -> Diagnostic {
    let reported = stdout.lines().next().and_then(|line| line.split_once('\t'));
    let (line, message) = match reported {
        Some((line, message)) => (
            line.trim().parse::<usize>().ok().filter(|n| *n > 0),
            message.trim().to_string(),
        ),
        None => {
            let stderr = stderr.trim();
            let message = if stderr.is_empty() { "invalid syntax" } else { stderr };
            (None, message.to_string())
        }
    };
    Diagnostic {
        path: path.to_string(),
        line,
        kind: DiagnosticKind::PythonSyntax,
        message,
    }
}

/// Tree-sitter parse plus the checks the grammar is too lenient for.
fn parse_python(path: &str, source: &str) -> Option<Diagnostic> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
        warn!(error = %e, "failed to load Python grammar");
        return None;
    }

    let tree = parser.parse(source, None)?;
    let root = tree.root_node();

    let (line, message) = if root.has_error() {
        match first_error(root) {
            Some(node) if node.is_missing() => (
                node.start_position().row + 1,
                format!("missing {}", node.kind()),
            ),
            Some(node) => (node.start_position().row + 1, "invalid syntax".to_string()),
            None => (1, "invalid syntax".to_string()),
        }
    } else {
        let (row, message) = first_rejected(root, true)?;
        (row + 1, message.to_string())
    };

    Some(Diagnostic {
        path: path.to_string(),
        line: Some(line),
        kind: DiagnosticKind::PythonSyntax,
        message,
    })
}

/// Depth-first search for the first error or missing node.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// First construct that parses under the grammar but not under Python 3,
/// as a 0-based row and a message.
fn first_rejected(node: Node<'_>, is_module: bool) -> Option<(usize, &'static str)> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();

    for child in children {
        let row = child.start_position().row;
        let found = match child.kind() {
            "print_statement" => Some((row, "Missing parentheses in call to 'print'")),
            "exec_statement" => Some((row, "Missing parentheses in call to 'exec'")),
            "return_statement" if is_module => Some((row, "'return' outside function")),
            "break_statement" if is_module => Some((row, "'break' outside loop")),
            "continue_statement" if is_module => Some((row, "'continue' not properly in loop")),
            "expression_statement" if is_module && starts_with_yield(child) => {
                Some((row, "'yield' outside function"))
            }
            kind if BLOCK_HEADERS.contains(&kind) => missing_block(child),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
        if let Some(found) = first_rejected(child, false) {
            return Some(found);
        }
    }
    None
}

fn starts_with_yield(statement: Node<'_>) -> bool {
    statement
        .named_child(0)
        .is_some_and(|child| child.kind() == "yield")
}

/// A block header whose body is empty or not indented past the header.
fn missing_block(header: Node<'_>) -> Option<(usize, &'static str)> {
    const MESSAGE: &str = "expected an indented block";

    let mut cursor = header.walk();
    let block = header.children(&mut cursor).find(|child| child.kind() == "block");
    let Some(block) = block else {
        let row = header.end_position().row.max(header.start_position().row + 1);
        return Some((row, MESSAGE));
    };

    let mut cursor = block.walk();
    let has_statement = block
        .named_children(&mut cursor)
        .any(|child| child.kind() != "comment");
    if !has_statement {
        return Some((header.start_position().row + 1, MESSAGE));
    }

    let (head, body) = (header.start_position(), block.start_position());
    if body.row > head.row && body.column <= head.column {
        return Some((body.row, MESSAGE));
    }
    None
}

fn check_html(path: &str, source: &str) -> Vec<Diagnostic> {
    let lower = source.to_lowercase();
    REQUIRED_HTML_TAGS
        .iter()
        .filter(|tag| !lower.contains(*tag))
        .map(|tag| Diagnostic {
            path: path.to_string(),
            line: None,
            kind: DiagnosticKind::HtmlStructure,
            message: format!("missing {tag}> tag"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvpfactory_artifacts::ArtifactStore;

    fn write_tree(files: &[(&str, &str)]) -> (tempfile::TempDir, ArtifactSet) {
        let tmp = tempfile::tempdir().unwrap();
        let mut set = ArtifactSet::new();
        for (path, content) in files {
            set.insert(path, *content).unwrap();
        }
        ArtifactStore::default().save(tmp.path(), &set).unwrap();
        (tmp, set)
    }

    fn with_commands(python_cmd: &str, node_cmd: &str, timeout_secs: u64) -> StaticValidator {
        StaticValidator::from_config(&ValidationConfig {
            python_cmd: python_cmd.into(),
            node_cmd: node_cmd.into(),
            node_timeout_secs: timeout_secs,
            ..ValidationConfig::default()
        })
    }

    fn without_interpreters() -> StaticValidator {
        with_commands(
            "mvpfactory-test-no-such-python",
            "mvpfactory-test-no-such-interpreter",
            10,
        )
    }

    /// Executable shell script standing in for an interpreter.
    #[cfg(unix)]
    fn fake_interpreter(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn python_syntax_error_reports_line() {
        let diag = parse_python("app.py", "def ok():\n    return 1\n\ndef broken(:\n    pass\n")
            .expect("diagnostic");
        assert_eq!(diag.kind, DiagnosticKind::PythonSyntax);
        assert_eq!(diag.line, Some(4));
        assert!(diag.to_string().starts_with("[app.py] SyntaxError line 4"));
    }

    #[test]
    fn valid_python_passes() {
        let source = "from fastapi import FastAPI\n\napp = FastAPI()\n\n@app.get('/')\nasync def root():\n    return {'ok': True}\n";
        assert!(parse_python("main.py", source).is_none());

        let nested = "class Repo:\n    def find(self, key):\n        for item in self.items:\n            if item == key:\n                return item\n            else:\n                continue\n        print(\"missing\", key)\n        return None\n";
        assert!(parse_python("repo.py", nested).is_none());
    }

    #[test]
    fn python2_statements_are_rejected() {
        let diag = parse_python("old.py", "x = 1\nprint \"hello\"\n").expect("print");
        assert_eq!(diag.line, Some(2));
        assert!(diag.message.contains("'print'"));

        let diag = parse_python("old.py", "exec \"x = 1\"\n").expect("exec");
        assert!(diag.message.contains("'exec'"));
    }

    #[test]
    fn unindented_body_is_rejected() {
        let diag = parse_python("flat.py", "def f():\nreturn 1\n").expect("diagnostic");
        assert_eq!(diag.line, Some(2));

        assert!(parse_python("flat.py", "class A:\nx = 1\n").is_some());
        assert!(parse_python("flat.py", "for i in range(3):\nprint(i)\n").is_some());
    }

    #[test]
    fn statements_outside_their_scope_are_rejected() {
        let diag = parse_python("top.py", "x = 1\nreturn x\n").expect("return");
        assert_eq!(diag.line, Some(2));
        assert!(diag.message.contains("'return' outside function"));

        assert!(parse_python("top.py", "yield 1\n").is_some());
        assert!(parse_python("top.py", "break\n").is_some());
        assert!(parse_python("top.py", "continue\n").is_some());
        assert!(parse_python("top.py", "def gen():\n    yield 1\n").is_none());
    }

    #[test]
    fn interpreter_output_becomes_diagnostic() {
        let diag = interpreter_diagnostic("a.py", "3\tinvalid syntax\n", "");
        assert_eq!(diag.line, Some(3));
        assert_eq!(diag.to_string(), "[a.py] SyntaxError line 3: invalid syntax");

        let diag = interpreter_diagnostic("a.py", "", "Traceback: boom\n");
        assert_eq!(diag.line, None);
        assert_eq!(diag.message, "Traceback: boom");
    }

    #[test]
    fn html_reports_each_missing_tag() {
        let diags = check_html("index.html", "<HTML><div>hi</div></HTML>");
        assert_eq!(diags.len(), 2);
        assert!(diags[0].message.contains("<head"));
        assert!(diags[1].message.contains("<body"));

        assert!(check_html("ok.html", "<html><head></head><body></body></html>").is_empty());
    }

    #[tokio::test]
    async fn missing_interpreter_is_skipped() {
        let (tmp, set) = write_tree(&[("src/app.js", "function (")]);
        let diags = without_interpreters().check(tmp.path(), &set).await;
        assert!(diags.is_empty());
    }

    #[tokio::test]
    async fn missing_python_falls_back_to_tree_sitter() {
        let (tmp, set) = write_tree(&[("main.py", "print \"hi\"\n")]);
        let diags = without_interpreters().check(tmp.path(), &set).await;
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::PythonSyntax);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_rejection_reports_interpreter_output() {
        let bin = tempfile::tempdir().unwrap();
        let node = fake_interpreter(
            bin.path(),
            "node",
            "echo 'SyntaxError: Unexpected token (' >&2\nexit 1",
        );
        let (tmp, set) = write_tree(&[("src/app.js", "function (")]);

        let diags = with_commands("mvpfactory-test-no-such-python", &node, 10)
            .check(tmp.path(), &set)
            .await;
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::ScriptSyntax);
        assert_eq!(
            diags[0].to_string(),
            "[src/app.js] JS Error: SyntaxError: Unexpected token ("
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_script_check_times_out() {
        let bin = tempfile::tempdir().unwrap();
        let node = fake_interpreter(bin.path(), "node", "sleep 5");
        let (tmp, set) = write_tree(&[("app.mjs", "export {}\n")]);

        let diags = with_commands("mvpfactory-test-no-such-python", &node, 1)
            .check(tmp.path(), &set)
            .await;
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::ScriptTimeout);
        assert_eq!(diags[0].to_string(), "[app.mjs] JS Timeout: syntax check timed out after 1s");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn python_interpreter_verdict_wins() {
        let bin = tempfile::tempdir().unwrap();
        let python = fake_interpreter(bin.path(), "python", "printf '2\\tinvalid syntax\\n'\nexit 1");
        // Valid under tree-sitter; the interpreter has the final say.
        let (tmp, set) = write_tree(&[("main.py", "x = 1\ny = 2\n")]);

        let diags = with_commands(&python, "mvpfactory-test-no-such-interpreter", 10)
            .check(tmp.path(), &set)
            .await;
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].to_string(), "[main.py] SyntaxError line 2: invalid syntax");
    }

    #[tokio::test]
    async fn findings_are_in_path_order_and_skip_missing_files() {
        let (tmp, mut set) = write_tree(&[
            ("b.py", "def f(:\n"),
            ("a.html", "<div></div>"),
            ("c.css", "body {"),
        ]);
        set.insert("z.py", "def g(:\n").unwrap();

        let diags = without_interpreters().check(tmp.path(), &set).await;
        let paths: Vec<&str> = diags.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a.html", "a.html", "a.html", "b.py"]);
    }
}
