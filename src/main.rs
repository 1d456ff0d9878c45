use ansi_term::Color::Red;
use qbasic::mach::{compile, execute, CompileOptions, ExecOptions, StdioPlatform};
use std::process::exit;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    let mut delay_micros = 0u64;
    let mut list = false;
    let mut file: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--delay" => match args.next().and_then(|s| s.parse().ok()) {
                Some(micros) => delay_micros = micros,
                None => usage(),
            },
            "--list" => list = true,
            "--help" | "-h" => usage(),
            _ if arg.starts_with('-') => usage(),
            _ if file.is_none() => file = Some(arg),
            _ => usage(),
        }
    }
    let file = match file {
        Some(file) => file,
        None => usage(),
    };
    let source = match std::fs::read_to_string(&file) {
        Ok(source) => source,
        Err(error) => fail(&format!("{}: {}", file, error)),
    };
    let name: Rc<str> = file.as_str().into();
    let options = CompileOptions { file: Some(name) };
    let compilation = match compile(&source, &options) {
        Ok(compilation) => compilation,
        Err(error) => fail(&error.to_string()),
    };
    if list {
        print!("{}", compilation.listing());
        return;
    }
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let _ = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst));
    }
    let mut platform = StdioPlatform::new(stop);
    let exec_options = ExecOptions { delay_micros };
    if let Err(error) = execute(&compilation.program, &mut platform, &exec_options) {
        fail(&error.to_string());
    }
}

fn usage() -> ! {
    eprintln!("Usage: qbasic [--delay MICROS] [--list] PROGRAM.BAS");
    exit(64);
}

fn fail(message: &str) -> ! {
    eprintln!("{}", Red.paint(message));
    exit(1);
}
