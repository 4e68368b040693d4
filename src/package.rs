//! DFU package parsing: reads the manifest out of the update ZIP and
//! extracts the init packet and firmware image it points to into
//! [`BufferPayload`]s.
//!
//! Grounded in the teacher's `zip_file::read_zip_file`, generalized from a
//! pair of owned `Vec<u8>`s to the `Payload`-producing shape the engine
//! consumes.

use crate::error::{DfuError, Result};
use crate::payload::BufferPayload;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use zip::ZipArchive;

#[derive(Debug, Deserialize)]
struct Application {
    dat_file: String,
    bin_file: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    application: Application,
}

#[derive(Debug, Deserialize)]
struct OuterManifest {
    manifest: Manifest,
}

/// The init packet and firmware image extracted from a DFU ZIP, ready to
/// hand to [`crate::engine::DfuEngine::run`].
pub struct Package {
    pub init: BufferPayload,
    pub firmware: BufferPayload,
}

/// Reads `manifest.json` from the archive at `path` and extracts the two
/// member files it names. Any deviation (missing manifest, absent
/// members, empty members) is a fatal `DfuError::Package`, per spec.
pub fn read(path: &str) -> Result<Package> {
    let reader = File::open(path)?;
    let mut archive = ZipArchive::new(reader).map_err(|e| DfuError::Package(e.to_string()))?;

    let application = {
        let mut file = archive
            .by_name("manifest.json")
            .map_err(|e| DfuError::Package(format!("manifest.json: {}", e)))?;
        let mut manifest_string = String::new();
        file.read_to_string(&mut manifest_string)
            .map_err(|e| DfuError::Package(e.to_string()))?;
        let outer: OuterManifest = serde_json::from_str(&manifest_string)
            .map_err(|e| DfuError::Package(format!("malformed manifest.json: {}", e)))?;
        outer.manifest.application
    };

    let dat = read_member(&mut archive, &application.dat_file)?;
    let bin = read_member(&mut archive, &application.bin_file)?;

    if dat.is_empty() {
        return Err(DfuError::Package(format!(
            "init packet member '{}' is empty",
            application.dat_file
        )));
    }
    if bin.is_empty() {
        return Err(DfuError::Package(format!(
            "firmware member '{}' is empty",
            application.bin_file
        )));
    }

    Ok(Package {
        init: BufferPayload::new(dat),
        firmware: BufferPayload::new(bin),
    })
}

fn read_member(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| DfuError::Package(format!("member '{}': {}", name, e)))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| DfuError::Package(e.to_string()))?;
    Ok(bytes)
}
