//! Per-language command matrix.
//!
//! Pure mapping from `(language, mode)` to a shell invocation, executed by
//! the in-sandbox harness with `/bin/sh -c`. Build commands rename the
//! submitted source (always mounted as `script`) to the canonical
//! per-language filename and compile or syntax-check it; compiled languages
//! leave a `runnable` artifact that the matching run command starts.
//!
//! No I/O happens here, only string construction. An unknown language maps
//! to `exit 255` on both sides so it can never produce a false OK or AC.

use std::path::Path;

/// Declared language set, as accepted by [`build_command`] / [`run_command`].
pub const LANGUAGES: &[&str] = &[
    "c", "c++", "c++11", "csharp", "haskell", "java", "python2", "python3", "swift", "perl",
    "perl6", "php", "ruby", "node",
];

const FAILING_COMMAND: &str = "exit 255";

/// Build (compile or validate) invocation for `lang`, with the submitted
/// source at `<dir>/script`.
pub fn build_command(lang: &str, dir: &Path) -> String {
    let d = dir.display();
    match lang.to_lowercase().as_str() {
        "c" => format!("mv {d}/script {d}/script.c && gcc -O2 -lm -o {d}/runnable {d}/script.c"),
        "c++" => {
            format!("mv {d}/script {d}/script.cpp && g++ -O2 -lm -o {d}/runnable {d}/script.cpp")
        }
        "c++11" => format!(
            "mv {d}/script {d}/script.cpp && g++ -O2 -lm -std=gnu++11 -o {d}/runnable {d}/script.cpp"
        ),
        "csharp" => format!(
            "mv {d}/script {d}/script.cs && \
             dmcs -warn:0 /r:System.Numerics.dll /codepage:utf8 {d}/script.cs -out:{d}/runnable"
        ),
        "haskell" => {
            format!("mv {d}/script {d}/script.hs && ghc -o {d}/runnable -O {d}/script.hs")
        }
        "java" => format!("mv {d}/script {d}/Main.java && javac -encoding UTF8 {d}/Main.java"),
        "python2" => format!("mv {d}/script {d}/script.py && python -m py_compile {d}/script.py"),
        "python3" => format!("mv {d}/script {d}/script.py && python3 -m py_compile {d}/script.py"),
        "swift" => format!(
            "cd {d} && touch Package.swift && mkdir -p {d}/Sources && \
             mv {d}/script {d}/Sources/main.swift && swift build"
        ),
        "perl" => format!("mv {d}/script {d}/script.pl && perl -cw {d}/script.pl"),
        "perl6" => format!("mv {d}/script {d}/script.pl && perl6 -c {d}/script.pl"),
        "php" => format!("mv {d}/script {d}/script.php && php -l {d}/script.php"),
        "ruby" => {
            format!("mv {d}/script {d}/script.rb && ruby --disable-gems -w -c {d}/script.rb")
        }
        "node" => format!("mv {d}/script {d}/script.js"),
        _ => FAILING_COMMAND.to_string(),
    }
}

/// Run invocation for `lang`, with build artifacts under `dir`.
pub fn run_command(lang: &str, dir: &Path) -> String {
    let d = dir.display();
    match lang.to_lowercase().as_str() {
        "c" | "c++" | "c++11" | "haskell" => format!("{d}/runnable"),
        "csharp" => format!("mono {d}/runnable"),
        "java" => {
            // -Xverify:none and stopping tiered compilation early keep JVM
            // startup inside the CPU budget.
            "java -ea -Xmx700m -Xverify:none -XX:+TieredCompilation -XX:TieredStopAtLevel=1 Main"
                .to_string()
        }
        "python2" => format!("python {d}/script.pyc"),
        "python3" => format!("python3 {d}/script.py"),
        "swift" => format!("{d}/.build/debug/script"),
        "perl" => format!("perl -X {d}/script.pl"),
        "perl6" => format!("perl6 {d}/script.pl"),
        "php" => format!("php {d}/script.php"),
        "ruby" => format!("ruby --disable-gems {d}/script.rb"),
        "node" => format!("node {d}/script.js"),
        _ => FAILING_COMMAND.to_string(),
    }
}
