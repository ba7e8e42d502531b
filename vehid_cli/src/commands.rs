//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{Result, WrapErr};
use serde_json::json;
use thiserror::Error;
use vehid_config::LoggedFrame;
use vehid_core::runner::{batch_by_period, drive as drive_session};
use vehid_core::util::period_ms;
use vehid_core::{
    Catalog, CycleCfg, Identification, IdentifyCfg, MatchResult, ReplaySource, Session,
    check_cycle_contract,
};
use vehid_traits::clock::MonotonicClock;
use vehid_traits::{Actuators, CanFrame, CarControl, VehicleIdentity};

/// Everything a subcommand needs, resolved from the config and global flags.
pub struct Context {
    pub catalog: Catalog,
    pub identify: IdentifyCfg,
    pub cycle: CycleCfg,
    pub json: bool,
}

#[derive(Debug, Error)]
#[error("self-check failed for {failed} of {total} vehicles")]
pub struct SelfCheckFailed {
    pub failed: usize,
    pub total: usize,
}

fn to_frame(f: &LoggedFrame) -> CanFrame {
    CanFrame::new(f.channel, f.id, f.data.clone())
}

fn load_log(path: &Path) -> Result<Vec<LoggedFrame>> {
    let frames = vehid_config::load_bus_log_csv(path)?;
    tracing::debug!(path = %path.display(), frames = frames.len(), "bus log loaded");
    Ok(frames)
}

/// Run identification over `logged`; returns the outcome and how many frames
/// it consumed.
fn identify_log(
    ctx: &Context,
    cfg: &IdentifyCfg,
    logged: &[LoggedFrame],
) -> Result<(Identification, usize)> {
    let mut source = ReplaySource::new(logged.iter().map(to_frame));
    let ident = vehid_core::identify(
        &mut source,
        &ctx.catalog.fingerprints,
        cfg,
        &MonotonicClock::new(),
    )?;
    let consumed = logged.len().saturating_sub(source.remaining());
    Ok((ident, consumed))
}

fn tied(ident: &Identification) -> Vec<VehicleIdentity> {
    match &ident.result {
        MatchResult::Ambiguous(cands) => cands.iter().map(|c| c.identity.clone()).collect(),
        _ => Vec::new(),
    }
}

pub fn identify(ctx: &Context, log: &Path, strict: bool) -> Result<()> {
    let logged = load_log(log)?;
    let mut cfg = ctx.identify.clone();
    if strict {
        cfg.allow_ambiguous = false;
    }
    let (ident, _) = identify_log(ctx, &cfg, &logged)?;
    let car = &ident.candidate.identity;
    let brand = ctx.catalog.params.get(car).map(|t| t.brand);
    let candidates = tied(&ident);

    if ctx.json {
        println!(
            "{}",
            json!({
                "car": car,
                "brand": brand,
                "variant": ident.candidate.variant,
                "frames": ident.frames,
                "fallback": ident.is_fallback(),
                "candidates": candidates,
            })
        );
    } else {
        println!(
            "identified: {car} (variant {}, {} frames)",
            ident.candidate.variant, ident.frames
        );
        if ident.is_fallback() {
            let names: Vec<_> = candidates.iter().map(VehicleIdentity::as_str).collect();
            println!(
                "fallback: first-registered of {} candidates ({})",
                candidates.len(),
                names.join(", ")
            );
        }
    }
    Ok(())
}

pub struct DriveArgs {
    pub engage_after: u64,
    pub steer: f32,
    pub accel: f32,
}

pub fn drive(ctx: &Context, log: &Path, args: &DriveArgs) -> Result<()> {
    let logged = load_log(log)?;
    let (ident, consumed) = identify_log(ctx, &ctx.identify, &logged)?;
    let mut session = Session::builder(&ctx.catalog)
        .with_identification(ident)
        .build()?;

    let period_ms = period_ms(ctx.cycle.rate_hz);
    let rest = logged.get(consumed..).unwrap_or_default();
    let batches = batch_by_period(rest.iter().map(|f| (f.t_ms, to_frame(f))), period_ms);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed))
        .wrap_err("install Ctrl-C handler")?;

    let actuators = Actuators {
        steer: args.steer,
        steering_angle_deg: args.steer * 90.0,
        accel: args.accel,
    };
    let engage_after = args.engage_after;
    let json_mode = ctx.json;
    let mut engaged_cycles = 0u64;
    let mut sent_frames = 0usize;

    let cycles = drive_session(
        &mut session,
        batches,
        &ctx.cycle,
        &MonotonicClock::new(),
        &stop,
        |i| {
            if i >= engage_after {
                CarControl::engaged(actuators)
            } else {
                CarControl::default()
            }
        },
        |i, out| {
            if out.command.enabled {
                engaged_cycles += 1;
            }
            sent_frames += out.command.frames.len();
            if json_mode {
                println!(
                    "{}",
                    json!({
                        "cycle": i,
                        "enabled": out.command.enabled,
                        "steer": out.command.steer,
                        "accel": out.command.accel,
                        "frames": out.command.frames.len(),
                        "v_ego": out.state.v_ego,
                        "can_valid": out.state.can_valid,
                        "radar_points": out.radar.points.len(),
                    })
                );
            }
        },
    );

    if stop.load(Ordering::Relaxed) {
        tracing::warn!(cycles, "drive interrupted");
    }
    if !json_mode {
        println!(
            "drove {} for {cycles} cycles ({engaged_cycles} engaged, {sent_frames} frames sent)",
            session.identity()
        );
    }
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let cat = &ctx.catalog;
    let mut rows = Vec::new();
    let fingerprinted = cat
        .fingerprints
        .entries()
        .iter()
        .map(|e| (e.identity().clone(), e.signatures().len()));
    let unfingerprinted = cat
        .interfaces
        .identities()
        .into_iter()
        .filter(|id| cat.fingerprints.get(id).is_none())
        .map(|id| (id.clone(), 0));

    for (identity, variants) in fingerprinted.chain(unfingerprinted) {
        let Some(tpl) = cat.params.get(&identity) else {
            continue;
        };
        rows.push((identity, variants, tpl));
    }

    if ctx.json {
        for (identity, variants, tpl) in &rows {
            println!(
                "{}",
                json!({
                    "car": identity,
                    "brand": tpl.brand,
                    "variants": variants,
                    "control": tpl.steer_control_type,
                    "tuning": tpl.tuning.as_ref().map(|t| t.kind()),
                    "radar_off_can": tpl.radar_off_can,
                })
            );
        }
        return Ok(());
    }

    println!(
        "{:<28} {:<9} {:>8} {:<7} {:<6} RADAR",
        "CAR", "BRAND", "VARIANTS", "CONTROL", "TUNING"
    );
    for (identity, variants, tpl) in &rows {
        println!(
            "{:<28} {:<9} {:>8} {:<7} {:<6} {}",
            identity.as_str(),
            tpl.brand.name(),
            variants,
            format!("{:?}", tpl.steer_control_type).to_lowercase(),
            tpl.tuning.as_ref().map_or("-", |t| t.kind()),
            if tpl.radar_off_can { "off-bus" } else { "on-bus" }
        );
    }
    Ok(())
}

/// Checks one vehicle end to end; returns the first problem found.
fn check_vehicle(cat: &Catalog, identity: &VehicleIdentity) -> std::result::Result<(), String> {
    cat.check_identity(identity).map_err(|e| format!("{e}"))?;
    let mut session = Session::builder(cat)
        .with_identity(identity.clone())
        .build()
        .map_err(|e| format!("{e}"))?;
    vehid_core::params::validate(session.params()).map_err(|e| format!("{e}"))?;
    check_cycle_contract(&mut session)?;

    let reading = session.radar_update(&[]);
    if !reading.is_empty() {
        return Err("ranging update without frames produced points".into());
    }
    if let Some(trigger) = session.radar_trigger() {
        match session.poll_radar(&trigger) {
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(format!("poll with trigger frame failed: {e}")),
            None => return Err("radar exposes a trigger but no polling path".into()),
        }
    }
    Ok(())
}

pub fn self_check(ctx: &Context) -> Result<()> {
    let cat = &ctx.catalog;
    let identities = cat.interfaces.identities();
    let total = identities.len();
    let mut failed = 0usize;

    if !ctx.json {
        println!("{:<28} RESULT", "CAR");
    }
    for identity in identities {
        let outcome = check_vehicle(cat, identity);
        if let Err(reason) = &outcome {
            failed += 1;
            tracing::error!(car = %identity, %reason, "self-check failed");
        }
        if ctx.json {
            println!(
                "{}",
                json!({
                    "car": identity,
                    "ok": outcome.is_ok(),
                    "reason": outcome.as_ref().err(),
                })
            );
        } else {
            match &outcome {
                Ok(()) => println!("{:<28} ok", identity.as_str()),
                Err(reason) => println!("{:<28} FAILED: {reason}", identity.as_str()),
            }
        }
    }

    if failed > 0 {
        return Err(eyre::Report::new(SelfCheckFailed { failed, total }));
    }
    if !ctx.json {
        println!("self-check ok ({total} vehicles)");
    }
    Ok(())
}
