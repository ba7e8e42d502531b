//! Driving session: one identity, its control interface and ranging interface.
//!
//! `SessionBuilder` enforces at compile time that an identity source was
//! chosen before `build()` is available. `try_build()` is always available for
//! dynamic checks. Construction either yields a complete session or a fatal
//! error; there is no partially initialized session.

use std::marker::PhantomData;

use tracing::{error, info};
use vehid_traits::{
    Brand, CanFrame, CarControl, CarInterface, CarParams, ControlCommand, Fingerprint,
    RadarError, RadarInterface, RadarReading, VehicleIdentity, VehicleState,
};

use crate::catalog::Catalog;
use crate::error::{BuildError, Result, VehidError};
use crate::runner::Identification;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct SessionBuilder<'c, I> {
    catalog: &'c Catalog,
    identity: Option<VehicleIdentity>,
    variant: Option<usize>,
    observed: Fingerprint,
    _i: PhantomData<I>,
}

impl<'c> SessionBuilder<'c, Missing> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            identity: None,
            variant: None,
            observed: Fingerprint::new(),
            _i: PhantomData,
        }
    }
}

impl<'c, I> SessionBuilder<'c, I> {
    fn set(self, identity: VehicleIdentity) -> SessionBuilder<'c, Set> {
        SessionBuilder {
            catalog: self.catalog,
            identity: Some(identity),
            variant: self.variant,
            observed: self.observed,
            _i: PhantomData,
        }
    }

    /// Use the outcome of a completed identification phase.
    pub fn with_identification(mut self, ident: Identification) -> SessionBuilder<'c, Set> {
        self.variant = Some(ident.candidate.variant);
        self.observed = ident.observed;
        self.set(ident.candidate.identity)
    }

    /// Skip fingerprinting and use a known identity.
    pub fn with_identity(mut self, identity: VehicleIdentity) -> SessionBuilder<'c, Set> {
        self.variant = None;
        self.set(identity)
    }

    /// Explicit "no car" session.
    pub fn mock(self) -> SessionBuilder<'c, Set> {
        self.with_identity(VehicleIdentity::MOCK)
    }

    /// Validate and build without compile-time guarantees.
    pub fn try_build(self) -> Result<Session> {
        let identity = self
            .identity
            .ok_or_else(|| eyre::Report::new(BuildError::MissingIdentity))?;
        match construct(self.catalog, &identity, self.variant, &self.observed) {
            Ok(session) => {
                let p = session.params();
                info!(
                    car = %identity,
                    brand = %p.brand,
                    variant = ?self.variant,
                    control = ?p.steer_control_type,
                    tuning = p.lateral_tuning.kind(),
                    radar_off_can = p.radar_off_can,
                    "session ready"
                );
                Ok(session)
            }
            Err(e) => {
                error!(car = %identity, error = %e, "session construction failed");
                Err(e)
            }
        }
    }
}

impl SessionBuilder<'_, Set> {
    pub fn build(self) -> Result<Session> {
        self.try_build()
    }
}

fn construct(
    catalog: &Catalog,
    identity: &VehicleIdentity,
    variant: Option<usize>,
    observed: &Fingerprint,
) -> Result<Session> {
    let entry = catalog.interfaces.resolve(identity)?;
    let params = catalog.params.build(identity, variant, observed)?;
    if params.brand != entry.brand() {
        return Err(eyre::Report::new(VehidError::InterfaceMismatch {
            identity: identity.clone(),
            detail: format!(
                "parameters are {} but interface is {}",
                params.brand,
                entry.brand()
            ),
        }));
    }

    let controller = (entry.controller.build)(&params);
    let state = (entry.state.build)(&params);
    let interface = (entry.interface.build)(params, controller, state).map_err(eyre::Report::new)?;
    if interface.brand() != entry.brand() {
        return Err(eyre::Report::new(VehidError::InterfaceMismatch {
            identity: identity.clone(),
            detail: format!(
                "factory built a {} interface, registered as {}",
                interface.brand(),
                entry.brand()
            ),
        }));
    }
    let radar = catalog.radars.resolve(interface.params())?;

    Ok(Session {
        identity: identity.clone(),
        interface,
        radar,
    })
}

/// Everything one cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutput {
    pub state: VehicleState,
    pub command: ControlCommand,
    pub radar: RadarReading,
}

/// Exclusively owns its interface instances; nothing is shared across sessions.
pub struct Session {
    identity: VehicleIdentity,
    interface: Box<dyn CarInterface>,
    radar: Box<dyn RadarInterface>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("brand", &self.interface.brand())
            .finish()
    }
}

impl Session {
    pub fn builder(catalog: &Catalog) -> SessionBuilder<'_, Missing> {
        SessionBuilder::new(catalog)
    }

    pub fn identity(&self) -> &VehicleIdentity {
        &self.identity
    }

    pub fn brand(&self) -> Brand {
        self.interface.brand()
    }

    pub fn params(&self) -> &CarParams {
        self.interface.params()
    }

    /// First half of a cycle.
    pub fn update(&mut self, cc: &CarControl, frames: &[CanFrame]) -> VehicleState {
        self.interface.update(cc, frames)
    }

    /// Second half of a cycle. Safe to call more than once per cycle.
    pub fn apply(&self, cc: &CarControl) -> ControlCommand {
        self.interface.apply(cc)
    }

    pub fn radar_update(&mut self, frames: &[CanFrame]) -> RadarReading {
        self.radar.update(frames)
    }

    /// Request frame of a polling radar; `None` for passive or absent radars.
    pub fn radar_trigger(&mut self) -> Option<CanFrame> {
        self.radar.as_polling().map(|p| p.trigger_frame())
    }

    /// Poll a radar that needs an explicit request. `None` when there is no
    /// polling path (passive sensor or radar off the bus).
    pub fn poll_radar(&mut self, trigger: &CanFrame) -> Option<std::result::Result<RadarReading, RadarError>> {
        self.radar.as_polling().map(|p| p.poll_once(trigger))
    }

    /// `update`, `apply` and the ranging update for one cycle, in that order.
    pub fn cycle(&mut self, cc: &CarControl, frames: &[CanFrame]) -> CycleOutput {
        let state = self.update(cc, frames);
        let command = self.apply(cc);
        let radar = self.radar_update(frames);
        CycleOutput {
            state,
            command,
            radar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintDatabase;
    use crate::mocks::echo_entry;
    use crate::params::{ParamsTable, ParamsTemplate};
    use crate::registry::{InterfaceRegistry, RadarRegistry};
    use vehid_traits::{LateralTuning, PidTuning, SteerControlType};

    fn catalog(template_brand: Brand) -> Catalog {
        let tpl = ParamsTemplate {
            mass: 1000.0,
            wheelbase: 2.5,
            center_to_front: 1.0,
            steer_ratio: 14.0,
            radar_off_can: true,
            tuning: Some(LateralTuning::Pid(PidTuning {
                kp_v: vec![0.1],
                kp_bp: vec![0.0],
                ..PidTuning::default()
            })),
            ..ParamsTemplate::new(template_brand, SteerControlType::Torque)
        };
        Catalog::new(
            FingerprintDatabase::default(),
            InterfaceRegistry::builder()
                .register(VehicleIdentity::MOCK, echo_entry(Brand::Mock))
                .build()
                .unwrap(),
            RadarRegistry::builder().build().unwrap(),
            ParamsTable::builder()
                .add(VehicleIdentity::MOCK, tpl)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn mock_session_cycles() {
        let cat = catalog(Brand::Mock);
        let mut s = Session::builder(&cat).mock().build().unwrap();
        assert_eq!(s.identity(), &VehicleIdentity::MOCK);
        let out = s.cycle(&CarControl::default(), &[]);
        assert_eq!(out.state.cycle, 1);
        assert!(!out.command.enabled);
        assert!(out.radar.is_empty());
        assert!(s.radar_trigger().is_none());
        assert!(s.poll_radar(&CanFrame::zeroed(0, 0x1, 1)).is_none());
    }

    #[test]
    fn template_brand_mismatch_is_fatal() {
        let cat = catalog(Brand::Honda);
        let err = Session::builder(&cat).mock().build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VehidError>(),
            Some(VehidError::InterfaceMismatch { .. })
        ));
    }

    #[test]
    fn try_build_without_identity() {
        let cat = catalog(Brand::Mock);
        let err = SessionBuilder::new(&cat).try_build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingIdentity)
        ));
    }
}
