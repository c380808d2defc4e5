//! Consistency check over the canonical files in the processed directory.
//! Exits 0 when every check passes and 1 otherwise.

use perfdata::config::Config;
use perfdata::logging;
use perfdata::pipeline::processing::quality_gate::ConsistencyValidator;

fn main() {
    dotenv::dotenv().ok();
    let guard = logging::init_logging("check-consistency.log");

    let code = match Config::load() {
        Ok(config) => {
            let report = ConsistencyValidator::new(&config.validator).validate_dir(&config.paths.processed_dir);
            print!("{}", report.transcript());
            report.exit_code()
        }
        Err(e) => {
            println!("❌ Could not load configuration: {}", e);
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}
