//! `glpool` command-line tool.
//!
//! ```text
//! glpool expand <file> [--options <toml>]
//! glpool check <fragment> [--vertex <file>] [--geometry <file>]
//!              [--class points|lines|triangles] [--options <toml>]
//! glpool schema
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use glpool::driver::headless::HeadlessDriver;
use glpool::options::Options;
use glpool::shader::{AssemblyMode, IncludeResolver, Issues, PrimitiveClass, Shader};
use glpool::GpuRuntime;

const USAGE: &str = "Usage:
  glpool expand <file> [--options <toml>]
  glpool check <fragment> [--vertex <file>] [--geometry <file>]
               [--class points|lines|triangles] [--options <toml>]
  glpool schema";

#[derive(Default)]
struct Args {
    positional: Vec<String>,
    options: Option<PathBuf>,
    vertex: Option<PathBuf>,
    geometry: Option<PathBuf>,
    class: Option<String>,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();
    while let Some(arg) = raw.next() {
        let mut value = |flag: &str| {
            raw.next()
                .ok_or_else(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--options" => args.options = Some(PathBuf::from(value("--options")?)),
            "--vertex" => args.vertex = Some(PathBuf::from(value("--vertex")?)),
            "--geometry" => args.geometry = Some(PathBuf::from(value("--geometry")?)),
            "--class" => args.class = Some(value("--class")?),
            flag if flag.starts_with("--") => return Err(format!("unknown flag {flag}")),
            other => args.positional.push(other.to_owned()),
        }
    }
    Ok(args)
}

fn load_options(path: Option<&Path>) -> Result<Options, String> {
    path.map_or_else(
        || Ok(Options::default()),
        |p| Options::load(p).map_err(|e| format!("{}: {e}", p.display())),
    )
}

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))
}

fn expand(args: &Args, out: &mut impl Write) -> Result<bool, String> {
    let [file] = args.positional.as_slice() else {
        return Err(USAGE.to_owned());
    };
    let options = load_options(args.options.as_deref())?;
    let resolver = IncludeResolver::from_options(&options.shader);
    let expansion = resolver.expand(&read(Path::new(file))?);
    for path in &expansion.included {
        log::info!("Included {}", path.display());
    }
    write!(out, "{}", expansion.text).map_err(|e| e.to_string())?;
    Ok(expansion.missing.is_empty())
}

fn primitive_class(name: Option<&str>) -> Result<AssemblyMode, String> {
    match name {
        None | Some("triangles") => Ok(AssemblyMode::IndividualTriangles),
        Some("lines") => Ok(AssemblyMode::IndividualLines),
        Some("points") => Ok(AssemblyMode::Points),
        Some(other) => Err(format!("unknown primitive class {other}")),
    }
}

fn check(args: &Args, out: &mut impl Write) -> Result<bool, String> {
    let [fragment] = args.positional.as_slice() else {
        return Err(USAGE.to_owned());
    };
    let options = load_options(args.options.as_deref())?;
    let mode = primitive_class(args.class.as_deref())?;
    let fragment = read(Path::new(fragment))?;
    let vertex = args.vertex.as_deref().map(read).transpose()?;
    let geometry = args.geometry.as_deref().map(read).transpose()?;

    let driver = Arc::new(HeadlessDriver::default());
    let runtime = GpuRuntime::builder(driver.clone(), driver)
        .options(options)
        .background_sweep(false)
        .build()
        .map_err(|e| e.to_string())?;
    let ctx = runtime
        .contexts()
        .use_context()
        .ok_or_else(|| "couldn't create a context".to_owned())?;

    let shader = Shader::new("check");
    let class: PrimitiveClass = mode.class();
    shader.add_source(class, vertex.as_deref(), geometry.as_deref(), Some(&fragment));
    let mut issues = Issues::new();
    let linked = shader.upload(&runtime, mode, ctx.id(), Some(&mut issues));

    let io = |e: std::io::Error| e.to_string();
    for issue in issues.iter() {
        writeln!(out, "{issue}").map_err(io)?;
    }
    write!(out, "{}", shader.summary()).map_err(io)?;
    Ok(linked && !issues.has_errors())
}

fn schema(out: &mut impl Write) -> Result<bool, String> {
    let schema = Options::json_schema();
    let text = serde_json::to_string_pretty(&schema).map_err(|e| e.to_string())?;
    writeln!(out, "{text}").map_err(|e| e.to_string())?;
    Ok(true)
}

fn main() -> ExitCode {
    env_logger::init();

    let mut raw = std::env::args().skip(1);
    let Some(command) = raw.next() else {
        log::error!("{USAGE}");
        return ExitCode::FAILURE;
    };
    let args = match parse_args(raw) {
        Ok(args) => args,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = match command.as_str() {
        "expand" => expand(&args, &mut out),
        "check" => check(&args, &mut out),
        "schema" => schema(&mut out),
        other => Err(format!("unknown command {other}\n{USAGE}")),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
