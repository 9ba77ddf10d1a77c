use crate::ast::Program;
use crate::error::PascalError;
use crate::evaluator::{Evaluator, OutputSink, StdoutSink};
use crate::parser::Parser;
use log::debug;

/// Lexes, parses and type-checks `source` without running it.
pub fn check(source: &str) -> Result<Program, PascalError> {
    debug!("parsing {} character(s) of source", source.chars().count());
    Parser::new(source).parse()
}

/// Parses `source` and executes it, sending `writeln` lines to `output`.
/// Lines written before an error are not retracted.
pub fn interpret(source: &str, output: &mut dyn OutputSink) -> Result<(), PascalError> {
    let program = check(source)?;

    debug!("executing program '{}'", program.name);
    Evaluator::new(&program.routines, output).evaluate_program(&program)?;
    debug!("program '{}' finished", program.name);
    Ok(())
}

/// Runs `source` against standard output and reports any error with its
/// source position. Returns whether it succeeded.
pub fn run(source: &str, filename: Option<&str>, check_only: bool) -> bool {
    let result = if check_only {
        check(source).map(|_| ())
    } else {
        interpret(source, &mut StdoutSink)
    };

    match result {
        Ok(()) => true,
        Err(error) => {
            error.report(source, filename);
            false
        }
    }
}
