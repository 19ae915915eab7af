use anyhow::Result;
use consentgate_core::consent::format_set;
use consentgate_core::SdkRegistry;
use serde_json::json;

use crate::cli::args::PolicyValidateArgs;
use crate::exit_codes;

pub fn validate(args: PolicyValidateArgs) -> Result<i32> {
    let registry = match SdkRegistry::from_path(&args.input) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("✘ Policy invalid: {}: {e}", args.input.display());
            return Ok(exit_codes::POLICY_ERROR);
        }
    };

    if args.json {
        let doc = json!({
            "path": args.input.display().to_string(),
            "version": registry.version(),
            "sdks": registry.all(),
            "warnings": registry.warnings(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("policy version {}", registry.version());
        for config in registry.all() {
            println!(
                "  {:<10} order={:<3} context={:?} requires={}",
                config.id.as_str(),
                config.init_order,
                config.execution_context,
                format_set(&config.required_consent)
            );
        }
        for warning in registry.warnings() {
            eprintln!("⚠ {warning}");
        }
    }

    if args.strict && !registry.warnings().is_empty() {
        eprintln!(
            "✘ Policy has {} warning(s) (--strict)",
            registry.warnings().len()
        );
        return Ok(exit_codes::POLICY_ERROR);
    }

    eprintln!("✔ Policy OK: {}", args.input.display());
    Ok(exit_codes::SUCCESS)
}
