//! Subcommand handlers. Each returns the process exit code.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use shiplock_gate::{
    DenyReason, GateConfig, RuntimeGate, EXIT_ALLOW, EXIT_ENVIRONMENT, EXIT_INTEGRITY_FAILED,
};
use shiplock_license::{
    activate, ActivationStore, Expiry, FingerprintComponents, FingerprintProvider, KeyAlgorithm,
    KeyManager, LicenseIssuer, LicenseRequest, LicenseVerifier, MachineFingerprint, Passphrase,
    PublicKey, SystemClock, SystemFingerprint, SystemInfo, Verification,
};
use shiplock_manifest::{verify_manifest, Manifest, ManifestBuilder, MANIFEST_FILE};
use tracing::info;

use crate::{Command, ManifestAction};

pub fn run(command: Command) -> Result<i32> {
    match command {
        Command::Keygen {
            out_dir,
            passphrase,
            no_passphrase,
        } => keygen(&out_dir, passphrase, no_passphrase),
        Command::Issue {
            key,
            passphrase,
            product,
            client,
            expires,
            machine_bound,
            machine_id,
            features,
            out,
        } => {
            let mut request = LicenseRequest::new(product, client)
                .expires(Expiry::parse_input(&expires)?)
                .machine_bound(machine_bound);
            if let Some(id) = machine_id {
                request = request.bind_to(MachineFingerprint::from_hex(&id)?);
            }
            for feature in &features {
                let (name, value) = parse_feature(feature)?;
                request = request.feature(name, value);
            }
            issue(&key, passphrase, request, &out)
        }
        Command::Verify {
            license,
            public_key,
            require_trusted_key,
            json,
        } => verify(&license, public_key.as_deref(), require_trusted_key, json),
        Command::Fingerprint { json } => fingerprint(json),
        Command::Manifest { action } => match action {
            ManifestAction::Build {
                root,
                out,
                exclude,
                workers,
            } => manifest_build(&root, out, exclude, workers),
            ManifestAction::Verify {
                root,
                manifest,
                json,
            } => manifest_verify(&root, manifest, json),
        },
        Command::Gate { config, json } => gate(&config, json),
        Command::Activate {
            license,
            public_key,
            store,
        } => activate_license(&license, public_key.as_deref(), store),
    }
}

fn keygen(out_dir: &Path, passphrase: Option<String>, no_passphrase: bool) -> Result<i32> {
    let passphrase = match (passphrase, no_passphrase) {
        (Some(p), _) if p.is_empty() => bail!("passphrase must not be empty"),
        (Some(p), _) => Some(Passphrase::from(p)),
        (None, true) => None,
        (None, false) => bail!(
            "a passphrase is required (--passphrase or SHIPLOCK_PASSPHRASE); \
             pass --no-passphrase to store the key unprotected"
        ),
    };

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let manager = KeyManager::new();
    let key = manager.generate_key_pair(KeyAlgorithm::Ed25519)?;
    let (private_path, public_path) =
        manager.write_key_files(out_dir, &key, passphrase.as_ref())?;

    println!("key id:      {}", key.public_key().key_id());
    println!("private key: {}", private_path.display());
    println!("public key:  {}", public_path.display());
    Ok(EXIT_ALLOW)
}

fn issue(
    key_path: &Path,
    passphrase: Option<String>,
    request: LicenseRequest,
    out: &Path,
) -> Result<i32> {
    let passphrase = passphrase.map(Passphrase::from);
    let key = KeyManager::new()
        .read_private_key_file(key_path, passphrase.as_ref())
        .with_context(|| format!("Failed to open private key {}", key_path.display()))?;

    let issuer = LicenseIssuer::new();
    let artifact = issuer.issue(request, &key)?;
    issuer.write(&artifact, out)?;

    println!("{}", out.display());
    Ok(EXIT_ALLOW)
}

fn verify(
    license: &Path,
    public_key: Option<&Path>,
    require_trusted_key: bool,
    as_json: bool,
) -> Result<i32> {
    let Some(verification) = verify_file(license, public_key, require_trusted_key)? else {
        return Ok(EXIT_ENVIRONMENT);
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&verification)?);
    } else {
        match &verification {
            Verification::Valid { payload } => {
                println!("VALID");
                println!("  license id: {}", payload.license_id);
                println!("  product:    {}", payload.product_id);
                println!("  client:     {}", payload.client);
                println!("  issued:     {}", payload.issued_at);
                println!("  expires:    {}", payload.expires_at);
                println!("  bound:      {}", payload.machine_bound);
                if !payload.features.is_empty() {
                    println!("  features:   {}", serde_json::to_string(&payload.features)?);
                }
            }
            Verification::Invalid {
                reason,
                step,
                detail,
            } => println!("INVALID ({reason}) at {step}: {detail}"),
        }
    }
    Ok(exit_code(&verification))
}

fn fingerprint(as_json: bool) -> Result<i32> {
    let components = FingerprintComponents::collect();
    let machine_id = SystemFingerprint.compute()?;
    let info = SystemInfo::collect();
    let slots = components.slots();
    let present = json!({
        "hardware_serial": !slots[0].is_empty(),
        "system_instance_id": !slots[1].is_empty(),
        "hostname": !slots[2].is_empty(),
        "primary_mac": !slots[3].is_empty(),
    });

    if as_json {
        let out = json!({
            "machine_id": machine_id.as_str(),
            "components": present,
            "system": info,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{machine_id}");
        eprintln!("{} {} ({})", info.os, info.arch, info.hostname);
    }
    Ok(EXIT_ALLOW)
}

fn manifest_build(
    root: &Path,
    out: Option<PathBuf>,
    exclude: Vec<String>,
    workers: Option<usize>,
) -> Result<i32> {
    let out = out.unwrap_or_else(|| root.join(MANIFEST_FILE));
    let mut builder = ManifestBuilder::new(root);
    for rel in exclude {
        builder = builder.exclude(rel);
    }
    if let Some(workers) = workers {
        builder = builder.workers(workers);
    }
    let manifest = builder
        .build()
        .with_context(|| format!("Failed to build manifest for {}", root.display()))?;
    manifest.write(&out)?;

    println!("{} files -> {}", manifest.len(), out.display());
    Ok(EXIT_ALLOW)
}

fn manifest_verify(root: &Path, manifest_path: Option<PathBuf>, as_json: bool) -> Result<i32> {
    let manifest_path = manifest_path.unwrap_or_else(|| root.join(MANIFEST_FILE));
    let manifest = Manifest::read(&manifest_path)
        .with_context(|| format!("Failed to read manifest {}", manifest_path.display()))?;
    let report = verify_manifest(root, &manifest)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.ok {
        println!("OK: {} files verified", report.checked);
    } else {
        println!("FAILED: {} of {} files", report.mismatches.len(), report.checked);
        for m in &report.mismatches {
            println!("  {}: {}", m.path, m.kind);
        }
    }
    Ok(if report.ok {
        EXIT_ALLOW
    } else {
        EXIT_INTEGRITY_FAILED
    })
}

fn gate(config_path: &Path, as_json: bool) -> Result<i32> {
    let config = GateConfig::load_from(config_path)?;
    let evaluation = RuntimeGate::from_config(&config)?.evaluate();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        let trail: Vec<String> = evaluation.states.iter().map(ToString::to_string).collect();
        println!("{}", trail.join(" -> "));
    }
    Ok(evaluation.decision.exit_code())
}

fn activate_license(
    license: &Path,
    public_key: Option<&Path>,
    store: Option<PathBuf>,
) -> Result<i32> {
    let store = match store {
        Some(path) => ActivationStore::new(path),
        None => ActivationStore::open_default()?,
    };
    let Some(verification) = verify_file(license, public_key, false)? else {
        return Ok(EXIT_ENVIRONMENT);
    };
    if !verification.is_valid() {
        let code = exit_code(&verification);
        if let Verification::Invalid { reason, detail, .. } = &verification {
            println!("INVALID ({reason}): {detail}");
        }
        return Ok(code);
    }

    let record = activate(&store, &verification, &SystemClock)?;
    info!(license_id = %record.license_id, "activation recorded");
    println!("activated {} -> {}", record.license_id, store.path().display());
    Ok(EXIT_ALLOW)
}

/// `None` when the license file cannot be read, which the gate also treats
/// as an environment failure rather than a usage error.
fn verify_file(
    license: &Path,
    public_key: Option<&Path>,
    require_trusted_key: bool,
) -> Result<Option<Verification>> {
    let bytes = match std::fs::read(license) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("error: Failed to read license {}: {e}", license.display());
            return Ok(None);
        }
    };
    let trusted = public_key
        .map(PublicKey::read_pem_file)
        .transpose()
        .context("Failed to load trusted public key")?;
    let verifier = LicenseVerifier::new().require_trusted_key(require_trusted_key);
    Ok(Some(verifier.verify(&bytes, trusted.as_ref())))
}

fn exit_code(verification: &Verification) -> i32 {
    verification
        .reason()
        .map_or(EXIT_ALLOW, |r| DenyReason::from(r).exit_code())
}

/// Splits `NAME=VALUE`, reading VALUE as JSON and falling back to a string.
fn parse_feature(raw: &str) -> Result<(String, Value)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("feature '{raw}' is not NAME=VALUE");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("feature '{raw}' has an empty name");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}
