// Systemd service units via systemctl

use crate::models::{ServiceKind, ServiceRecord};
use crate::sources::{SourceError, run_command};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Units passed to one `systemctl show` invocation.
const SHOW_BATCH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitLine {
    pub unit: String,
    pub sub: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct SystemdRepo;

impl SystemdRepo {
    pub fn new() -> Self {
        Self
    }

    /// All service units, loaded or not, with their main pid where one is
    /// running. A host not booted with systemd has no units.
    #[instrument(skip(self), fields(repo = "systemd", operation = "list_services"))]
    pub async fn list_services(&self) -> Result<Vec<ServiceRecord>, SourceError> {
        if !Path::new("/run/systemd/system").exists() {
            debug!("systemd not running, no units collected");
            return Ok(Vec::new());
        }

        let out = run_command(
            "systemctl",
            &[
                "list-units",
                "--type=service",
                "--all",
                "--no-pager",
                "--no-legend",
                "--plain",
            ],
        )
        .await?;
        let units = parse_list_units(&out);

        let mut pids = HashMap::with_capacity(units.len());
        for chunk in units.chunks(SHOW_BATCH) {
            let mut args = vec!["show", "--property=Id,MainPID"];
            args.extend(chunk.iter().map(|u| u.unit.as_str()));
            match run_command("systemctl", &args).await {
                Ok(out) => pids.extend(parse_show_output(&out)),
                Err(e) => debug!(error = %e, "systemctl show failed, main pids omitted"),
            }
        }

        Ok(units
            .into_iter()
            .map(|u| {
                let mut record = ServiceRecord::new(
                    u.unit.trim_end_matches(".service"),
                    ServiceKind::Systemd,
                    u.sub,
                );
                record.pid = pids.get(&u.unit).copied();
                record.description = Some(u.description).filter(|d| !d.is_empty());
                record.id = Some(u.unit);
                record
            })
            .collect())
    }
}

/// Parse `systemctl list-units --plain --no-legend` rows:
/// `UNIT LOAD ACTIVE SUB DESCRIPTION...`.
pub fn parse_list_units(output: &str) -> Vec<UnitLine> {
    output
        .lines()
        .filter_map(|line| {
            // failed units may still carry a status bullet
            let mut rest = line.trim().trim_start_matches('●');
            let unit = next_field(&mut rest)?;
            if !unit.ends_with(".service") {
                return None;
            }
            // LOAD and ACTIVE columns
            next_field(&mut rest)?;
            next_field(&mut rest)?;
            let sub = next_field(&mut rest)?;
            Some(UnitLine {
                unit: unit.to_string(),
                sub: sub.to_string(),
                description: rest.trim().to_string(),
            })
        })
        .collect()
}

fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s = rest.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (field, tail) = s.split_at(end);
    *rest = tail;
    Some(field)
}

/// Parse `systemctl show --property=Id,MainPID` blocks into unit -> pid.
/// A MainPID of 0 means no running main process and is omitted.
pub fn parse_show_output(output: &str) -> HashMap<String, u32> {
    let mut pids = HashMap::new();
    for block in output.split("\n\n") {
        let mut id = None;
        let mut pid = None;
        for line in block.lines() {
            match line.split_once('=') {
                Some(("Id", v)) => id = Some(v.trim()),
                Some(("MainPID", v)) => pid = v.trim().parse::<u32>().ok(),
                _ => {}
            }
        }
        if let (Some(id), Some(pid)) = (id, pid)
            && pid > 0
        {
            pids.insert(id.to_string(), pid);
        }
    }
    pids
}
