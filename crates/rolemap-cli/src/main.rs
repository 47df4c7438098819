//! Rolemap - Main entry point
//!
//! Loads a device setup and persisted bindings, replays the devices through
//! the mapping engine and prints the resulting role tables.

mod bindings_file;
mod config;

use anyhow::Result;
use clap::Parser;
use rolemap_core::{
    DeviceTable, ImportMode, RoleMapRegistry, RoleReference, RoleTypeMap,
};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bindings_file::BindingFile;

#[derive(Parser, Debug)]
#[command(name = "rolemap")]
#[command(about = "Role to device mapping and binding inspector")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "rolemap.toml")]
    config: PathBuf,

    /// Path to the binding file, overriding the configuration
    #[arg(short, long)]
    bindings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Bind every mapped role to its current device
    #[arg(long)]
    bind_all: bool,

    /// Remove every binding before printing
    #[arg(long, conflicts_with = "bind_all")]
    unbind_all: bool,

    /// Write the binding file before exiting
    #[arg(long)]
    save: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Rolemap v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;
    let bindings_path = args
        .bindings
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.bindings.path));
    let mut binding_file = BindingFile::load_or_default(&bindings_path)?;

    let devices = Rc::new(DeviceTable::new());
    let mut registry = RoleMapRegistry::new(devices.clone());
    registry.warm_up();

    if config.bindings.apply_on_load && binding_file.apply_on_load {
        let report = registry.import_bindings(&binding_file.roles, ImportMode::Replace);
        if report.skipped() > 0 {
            warn!(
                skipped_unknown = report.skipped_unknown,
                skipped_conflict = report.skipped_conflict,
                "Some bindings were not applied"
            );
        }
    }

    // Replay configured devices as backend notifications
    for device in &config.devices {
        let state = device.to_state();
        devices.connect(device.device(), state.clone());
        registry.notify_connection_changed(device.device(), state.class, &state.serial, true)?;
    }

    let ids: Vec<_> = registry.map_ids().collect();
    if args.unbind_all {
        let removed: usize = ids.iter().map(|&id| registry.unbind_all(id)).sum();
        info!(removed, "Removed all bindings");
    }
    if args.bind_all {
        let added: usize = ids.iter().map(|&id| registry.bind_all(id)).sum();
        info!(added, "Bound all mapped roles");
    }

    for id in &ids {
        if let Some(map) = registry.get_map(*id) {
            print_map(map);
        }
    }

    if !config.references.is_empty() {
        println!("References:");
        for data in &config.references {
            let reference = RoleReference::from(data.clone());
            let role_type = reference.role_type(&mut registry);
            let role = reference.role_value(&mut registry);
            let device = reference.device_index(&mut registry);
            let role_name = registry
                .descriptor(role_type)
                .role_name(role)
                .unwrap_or("?")
                .to_string();
            println!(
                "  - {}/{} -> {}.{} on device {}",
                data.role_type, data.role_value, role_type, role_name, device
            );
        }
    }

    if args.save || config.bindings.save_on_exit {
        binding_file.roles = registry.export_bindings();
        binding_file.save(&bindings_path)?;
    }

    Ok(())
}

fn print_map(map: &RoleTypeMap) {
    let descriptor = map.descriptor();
    println!(
        "{} ({}):",
        map.role_type_name(),
        map.handler_name().unwrap_or("no handler")
    );
    for &role in descriptor.valid_roles() {
        let device = map.mapped_device(role);
        let serials: Vec<&str> = map.bound_serials(role).collect();
        if !device.is_valid() && serials.is_empty() {
            continue;
        }
        let name = descriptor.role_name(role).unwrap_or("?");
        if serials.is_empty() {
            println!("  - {} -> device {}", name, device);
        } else {
            println!("  - {} -> device {} (bound: {})", name, device, serials.join(", "));
        }
    }
}
