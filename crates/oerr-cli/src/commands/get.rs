//! Get command implementation

use crate::error::CliError;
use anyhow::Result;
use oerr_core::{Identifier, MessageStore, Payload};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Record<'a> {
    id: String,
    #[serde(flatten)]
    payload: &'a Payload,
}

/// Print the stored explanation for `id`.
///
/// A miss is reported on stderr and is not an error.
pub fn execute(id: &str, store: &Path, json: bool) -> Result<()> {
    let id: Identifier = id.parse().map_err(CliError::from)?;
    let mut messages = MessageStore::open(store).map_err(CliError::from)?;

    let result = match messages.get(&id) {
        Ok(payload) => print_record(&id, &payload, json),
        Err(e) if e.is_not_found() => {
            eprintln!("{id}: not found in {}", store.display());
            Ok(())
        },
        Err(e) => Err(CliError::from(e).into()),
    };
    messages.close().map_err(CliError::from)?;
    result
}

fn print_record(id: &Identifier, payload: &Payload, json: bool) -> Result<()> {
    if json {
        let record = Record {
            id: id.to_string(),
            payload,
        };
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{id}: {payload}");
    }
    Ok(())
}
