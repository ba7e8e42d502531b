//! Vehicle parameter construction.
//!
//! Each identity registers a [`ParamsTemplate`]. `ParamsTable::build` copies
//! the template, applies variant and auxiliary-hardware overrides, selects the
//! lateral tuning and validates the result. A template that fails validation
//! is a bug in the static table and is reported as `InvalidParameters`.

use std::collections::HashMap;

use tracing::debug;
use vehid_traits::{
    Brand, CarParams, Fingerprint, FingerprintMeta, LateralTuning, SteerControlType,
    VehicleIdentity,
};

use crate::error::{BuildError, Result, VehidError};

/// Lower bound on a sane vehicle mass (kg).
pub const MIN_MASS: f32 = 1.0;
/// Lower bound on the steering rate cost.
pub const MIN_STEER_RATE_COST: f32 = 1e-3;

/// Parameter change triggered by a signature variant or an auxiliary signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HardwareOverride {
    RadarOffCan(bool),
    GasInterceptor,
    BlindSpot,
    SteerRateCost(f32),
}

impl HardwareOverride {
    fn apply(self, params: &mut CarParams) {
        match self {
            HardwareOverride::RadarOffCan(off) => params.radar_off_can = off,
            HardwareOverride::GasInterceptor => params.enable_gas_interceptor = true,
            HardwareOverride::BlindSpot => params.enable_bsm = true,
            HardwareOverride::SteerRateCost(cost) => params.steer_rate_cost = cost,
        }
    }
}

/// Override applied when `(channel, id)` was seen during identification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxRule {
    pub channel: u8,
    pub id: u32,
    pub apply: HardwareOverride,
}

impl AuxRule {
    pub const fn new(channel: u8, id: u32, apply: HardwareOverride) -> Self {
        Self { channel, id, apply }
    }
}

/// Static per-identity parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsTemplate {
    pub brand: Brand,
    pub mass: f32,
    pub wheelbase: f32,
    pub center_to_front: f32,
    pub steer_ratio: f32,
    pub steer_rate_cost: f32,
    pub steer_control_type: SteerControlType,
    /// Required for torque control; angle control falls back to an empty PID.
    pub tuning: Option<LateralTuning>,
    pub radar_off_can: bool,
    pub aux_rules: Vec<AuxRule>,
    /// `(signature variant, override)` pairs.
    pub variant_overrides: Vec<(usize, HardwareOverride)>,
}

impl ParamsTemplate {
    /// Template with the brand defaults that every field must then refine.
    pub fn new(brand: Brand, steer_control_type: SteerControlType) -> Self {
        Self {
            brand,
            mass: 0.0,
            wheelbase: 0.0,
            center_to_front: 0.0,
            steer_ratio: 0.0,
            steer_rate_cost: 0.5,
            steer_control_type,
            tuning: None,
            radar_off_can: false,
            aux_rules: Vec::new(),
            variant_overrides: Vec::new(),
        }
    }
}

/// Read-only after construction, like the fingerprint database.
#[derive(Debug, Clone, Default)]
pub struct ParamsTable {
    templates: HashMap<VehicleIdentity, ParamsTemplate>,
}

impl ParamsTable {
    pub fn builder() -> ParamsTableBuilder {
        ParamsTableBuilder::default()
    }

    pub fn get(&self, identity: &VehicleIdentity) -> Option<&ParamsTemplate> {
        self.templates.get(identity)
    }

    pub fn contains(&self, identity: &VehicleIdentity) -> bool {
        self.templates.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Resolve the session parameters for `identity`.
    ///
    /// Variant overrides apply first, then auxiliary rules whose `(channel, id)`
    /// appears in `observed`, each in declaration order.
    pub fn build(
        &self,
        identity: &VehicleIdentity,
        variant: Option<usize>,
        observed: &Fingerprint,
    ) -> Result<CarParams> {
        let tpl = self
            .templates
            .get(identity)
            .ok_or_else(|| eyre::Report::new(VehidError::UnknownIdentity(identity.clone())))?;

        let lateral_tuning = match (&tpl.tuning, tpl.steer_control_type) {
            (Some(t), _) => t.clone(),
            (None, SteerControlType::Angle) => LateralTuning::default(),
            (None, SteerControlType::Torque) => {
                return Err(invalid(identity, "torque control requires a lateral tuning"));
            }
        };

        let mut params = CarParams {
            car_name: identity.clone(),
            brand: tpl.brand,
            mass: tpl.mass,
            wheelbase: tpl.wheelbase,
            center_to_front: tpl.center_to_front,
            steer_ratio: tpl.steer_ratio,
            steer_rate_cost: tpl.steer_rate_cost,
            steer_control_type: tpl.steer_control_type,
            lateral_tuning,
            radar_off_can: tpl.radar_off_can,
            enable_gas_interceptor: false,
            enable_bsm: false,
            fingerprint: FingerprintMeta {
                variant,
                observed: observed.clone(),
            },
        };

        if let Some(v) = variant {
            for (_, ov) in tpl.variant_overrides.iter().filter(|(i, _)| *i == v) {
                debug!(identity = %identity, variant = v, ?ov, "variant override");
                ov.apply(&mut params);
            }
        }
        for rule in &tpl.aux_rules {
            if observed.contains(rule.channel, rule.id) {
                debug!(
                    identity = %identity,
                    channel = rule.channel,
                    id = %format!("0x{:x}", rule.id),
                    ov = ?rule.apply,
                    "auxiliary hardware detected"
                );
                rule.apply.apply(&mut params);
            }
        }

        validate(&params)?;
        Ok(params)
    }
}

fn invalid(identity: &VehicleIdentity, reason: impl Into<String>) -> eyre::Report {
    eyre::Report::new(VehidError::InvalidParameters {
        identity: identity.clone(),
        reason: reason.into(),
    })
}

/// Check the invariants every constructed `CarParams` must satisfy.
pub fn validate(p: &CarParams) -> Result<()> {
    let id = &p.car_name;
    if !p.mass.is_finite() || p.mass <= MIN_MASS {
        return Err(invalid(id, format!("mass must be > {MIN_MASS} (got {})", p.mass)));
    }
    if !p.steer_rate_cost.is_finite() || p.steer_rate_cost <= MIN_STEER_RATE_COST {
        return Err(invalid(
            id,
            format!(
                "steer_rate_cost must be > {MIN_STEER_RATE_COST} (got {})",
                p.steer_rate_cost
            ),
        ));
    }
    if !(p.wheelbase.is_finite() && p.wheelbase > 0.0) {
        return Err(invalid(id, "wheelbase must be > 0"));
    }
    if !(p.steer_ratio.is_finite() && p.steer_ratio > 0.0) {
        return Err(invalid(id, "steer_ratio must be > 0"));
    }
    if !(p.center_to_front > 0.0 && p.center_to_front < p.wheelbase) {
        return Err(invalid(id, "center_to_front must lie within the wheelbase"));
    }
    if p.steer_control_type != SteerControlType::Angle && p.lateral_tuning.primary().is_empty() {
        return Err(invalid(
            id,
            format!("{} tuning has an empty primary vector", p.lateral_tuning.kind()),
        ));
    }
    if let LateralTuning::Pid(pid) = &p.lateral_tuning {
        if pid.kp_bp.len() != pid.kp_v.len() || pid.ki_bp.len() != pid.ki_v.len() {
            return Err(invalid(id, "pid breakpoints and values differ in length"));
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct ParamsTableBuilder {
    templates: Vec<(VehicleIdentity, ParamsTemplate)>,
}

impl ParamsTableBuilder {
    pub fn add(mut self, identity: VehicleIdentity, template: ParamsTemplate) -> Self {
        self.templates.push((identity, template));
        self
    }

    pub fn build(self) -> Result<ParamsTable> {
        let mut templates = HashMap::with_capacity(self.templates.len());
        for (identity, tpl) in self.templates {
            if templates.contains_key(&identity) {
                return Err(eyre::Report::new(BuildError::DuplicateIdentity(identity)));
            }
            templates.insert(identity, tpl);
        }
        Ok(ParamsTable { templates })
    }
}
