//! Verify command implementation.

use super::OpenStore;
use fieldlog_core::{schema, QueueStatus};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Checks that ran.
    pub checks: usize,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn check(&mut self, ok: bool, problem: impl FnOnce() -> String) {
        self.checks += 1;
        if !ok {
            self.errors.push(problem());
        }
    }
}

/// Verifies the image at `path`.
pub fn verify(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let opened = OpenStore::existing(path)?;
    let store = &opened.store;
    let mut result = VerifyResult::default();

    let problems = store.integrity_check()?;
    result.check(problems.is_empty(), || {
        format!("integrity: {}", problems.join("; "))
    });

    let version = store.schema_version()?;
    result.check(version == schema::SCHEMA_VERSION, || {
        format!(
            "schema version {version}, expected {}",
            schema::SCHEMA_VERSION
        )
    });

    for item in store.queue().list(None, None)? {
        result.check(schema::table(&item.table_name).is_some(), || {
            format!("queue item {} targets unknown table {}", item.id, item.table_name)
        });
        result.check(!item.record_id.is_empty(), || {
            format!("queue item {} has no record id", item.id)
        });
        result.check(item.status != QueueStatus::Syncing, || {
            format!("queue item {} was interrupted mid-push", item.id)
        });
    }

    Ok(result)
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let result = verify(path)?;
    print_result(path, &result);

    if result.is_ok() {
        Ok(())
    } else {
        Err(format!("{} problem(s) found", result.errors.len()).into())
    }
}

fn print_result(path: &Path, result: &VerifyResult) {
    println!("Verifying {}", path.display());
    println!("  Checks run: {}", result.checks);
    if result.is_ok() {
        println!("  ✓ OK");
    } else {
        for error in &result.errors {
            println!("  ✗ {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_image;

    #[test]
    fn sample_image_is_healthy() {
        let (_dir, path) = sample_image();
        let result = verify(&path).unwrap();
        assert!(result.is_ok(), "{:?}", result.errors);
        assert!(result.checks > 3);
    }

    #[test]
    fn interrupted_items_are_reported() {
        let (_dir, path) = sample_image();
        {
            let opened = OpenStore::existing(&path).unwrap();
            let ids: Vec<String> = opened
                .store
                .queue()
                .list(None, Some(1))
                .unwrap()
                .into_iter()
                .map(|item| item.id)
                .collect();
            opened.store.queue().mark(&ids, QueueStatus::Syncing, None).unwrap();
            opened.save().unwrap();
        }

        let result = verify(&path).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("interrupted"));
    }
}
