use anyhow::Result;
use consentgate_core::storage::format_inventory;
use consentgate_core::{GateConfig, VendorStorage};
use serde_json::json;

use crate::cli::args::CacheTargetArgs;
use crate::exit_codes;

fn storage_for(args: &CacheTargetArgs) -> VendorStorage {
    GateConfig::from_env()
        .with_data_dir(&args.data_dir)
        .vendor_storage()
}

pub async fn inspect(args: CacheTargetArgs) -> Result<i32> {
    let storage = storage_for(&args);
    let files = match storage.scan().await {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error checking cache: {e}");
            return Ok(exit_codes::STORAGE_ERROR);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json!({ "files": files }))?);
    } else {
        println!("{}", format_inventory(&files));
    }
    Ok(exit_codes::SUCCESS)
}

pub async fn purge(args: CacheTargetArgs) -> Result<i32> {
    let report = storage_for(&args).purge().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Deleted {} vendor files", report.deleted);
        for failure in &report.failures {
            eprintln!("  ✘ {}: {}", failure.path.display(), failure.error);
        }
    }

    if report.is_complete() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::STORAGE_ERROR)
    }
}
