//! Generic control interface composed from a brand's controller and state.

use tracing::info;
use vehid_traits::{
    Brand, CarControl, CarController, CarInterface, CarParams, CarState, ControlCommand,
    VehicleState,
};

use crate::error::VehidError;

/// Per-session engagement. Follows `CarControl::enabled` of the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Engagement {
    #[default]
    Disabled,
    Engaged,
}

impl From<bool> for Engagement {
    fn from(enabled: bool) -> Self {
        if enabled {
            Engagement::Engaged
        } else {
            Engagement::Disabled
        }
    }
}

/// Interface that delegates decoding to a `CarState` and actuation to a
/// `CarController` of the same brand.
pub struct StandardInterface {
    params: CarParams,
    controller: Box<dyn CarController>,
    state: Box<dyn CarState>,
    last_state: VehicleState,
    engagement: Engagement,
}

impl core::fmt::Debug for StandardInterface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StandardInterface")
            .field("car_name", &self.params.car_name)
            .field("brand", &self.params.brand)
            .field("engagement", &self.engagement)
            .field("cycle", &self.last_state.cycle)
            .finish()
    }
}

impl StandardInterface {
    /// Pair `controller` and `state` under `params`; all three must agree on brand.
    pub fn new(
        params: CarParams,
        controller: Box<dyn CarController>,
        state: Box<dyn CarState>,
    ) -> Result<Self, VehidError> {
        for (part, brand) in [("controller", controller.brand()), ("state", state.brand())] {
            if brand != params.brand {
                return Err(VehidError::InterfaceMismatch {
                    identity: params.car_name.clone(),
                    detail: format!("{part} is {brand} but parameters are {}", params.brand),
                });
            }
        }
        Ok(Self {
            params,
            controller,
            state,
            last_state: VehicleState::default(),
            engagement: Engagement::Disabled,
        })
    }

    /// Constructor with the registry's `InterfaceCtor` shape.
    pub fn boxed(
        params: CarParams,
        controller: Box<dyn CarController>,
        state: Box<dyn CarState>,
    ) -> Result<Box<dyn CarInterface>, VehidError> {
        Ok(Box::new(Self::new(params, controller, state)?))
    }

    pub fn engagement(&self) -> Engagement {
        self.engagement
    }

    pub fn last_state(&self) -> &VehicleState {
        &self.last_state
    }
}

impl CarInterface for StandardInterface {
    fn brand(&self) -> Brand {
        self.params.brand
    }

    fn params(&self) -> &CarParams {
        &self.params
    }

    fn update(&mut self, cc: &CarControl, frames: &[vehid_traits::CanFrame]) -> VehicleState {
        let next = Engagement::from(cc.enabled);
        if next != self.engagement {
            info!(car = %self.params.car_name, from = ?self.engagement, to = ?next, "engagement changed");
            self.engagement = next;
        }
        self.last_state = self.state.update(frames);
        self.last_state.clone()
    }

    fn apply(&self, cc: &CarControl) -> ControlCommand {
        let mut cmd = self.controller.apply(cc, &self.last_state);
        cmd.enabled = cc.enabled;
        cmd
    }
}
