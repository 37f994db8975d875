use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use touchdown::{ActuationCommand, ContactEvent, ContactTag, PhysicsBackend, StartState};

use crate::config::SimConfig;

/// Height above the ground at which a resting contact is considered broken.
const LIFTOFF_CLEARANCE_M: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct VehicleParams {
    pub mass_kg: f64,
    pub inertia_kgm2: Matrix3<f64>,
    pub inertia_inv_kgm2: Matrix3<f64>,
    pub engine_offset_m: f64,
    pub angular_damping: f64,
    pub gravity_mps2: f64,
}

impl VehicleParams {
    pub fn from_config(cfg: &SimConfig) -> Self {
        let [ixx, iyy, izz] = cfg.inertia_kgm2;
        Self {
            mass_kg: cfg.mass_kg,
            inertia_kgm2: Matrix3::from_diagonal(&Vector3::new(ixx, iyy, izz)),
            inertia_inv_kgm2: Matrix3::from_diagonal(&Vector3::new(1.0 / ixx, 1.0 / iyy, 1.0 / izz)),
            engine_offset_m: cfg.engine_offset_m,
            angular_damping: cfg.angular_damping,
            gravity_mps2: cfg.gravity_mps2,
        }
    }

    /// Thrust fraction that balances gravity, given the engine limit.
    pub fn hover_fraction(&self, max_thrust_force: f64) -> f64 {
        (self.mass_kg * self.gravity_mps2 / max_thrust_force).clamp(0.0, 1.0)
    }
}

/// Flat ground with a landing pad disc and a finite down ray.
#[derive(Debug, Clone)]
pub struct Terrain {
    pub ground_height_m: f64,
    pub pad: Vector3<f64>,
    pub pad_radius_m: f64,
    pub ray_length_m: f64,
    pub half_extent_m: f64,
}

impl Terrain {
    pub fn new(cfg: &SimConfig, pad: Vector3<f64>) -> Self {
        Self {
            ground_height_m: cfg.ground_height_m,
            pad,
            pad_radius_m: cfg.pad_radius_m,
            ray_length_m: cfg.ray_length_m,
            half_extent_m: cfg.terrain_half_extent_m,
        }
    }

    pub fn covers(&self, pos: &Vector3<f64>) -> bool {
        (pos.x - self.pad.x).abs() <= self.half_extent_m && (pos.z - self.pad.z).abs() <= self.half_extent_m
    }

    pub fn surface_tag(&self, pos: &Vector3<f64>) -> ContactTag {
        let radial = (pos.x - self.pad.x).hypot(pos.z - self.pad.z);
        if radial <= self.pad_radius_m {
            ContactTag::LandingPad
        } else {
            ContactTag::Ground
        }
    }
}

/// Compose `Ry(y) * Rx(x) * Rz(z)` from per-axis degrees.
pub fn quaternion_from_euler_degrees(deg: Vector3<f64>) -> UnitQuaternion<f64> {
    let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), deg.x.to_radians());
    let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), deg.y.to_radians());
    let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), deg.z.to_radians());
    ry * rx * rz
}

/// Inverse of [`quaternion_from_euler_degrees`].
///
/// Yaw is the outermost rotation so a level vehicle always reads pitch and
/// roll of zero whatever its heading.
pub fn euler_degrees(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let rot = q.to_rotation_matrix();
    let m = rot.matrix();
    let sin_x = (-m[(1, 2)]).clamp(-1.0, 1.0);
    let x = sin_x.asin();

    let (y, z) = if sin_x.abs() < 1.0 - 1.0e-9 {
        (m[(0, 2)].atan2(m[(2, 2)]), m[(1, 0)].atan2(m[(1, 1)]))
    } else {
        // Gimbal lock: only y -/+ z is observable, fold it into y.
        ((-m[(2, 0)]).atan2(m[(0, 0)]), 0.0)
    };

    Vector3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

pub struct SimulatedVehicle {
    params: VehicleParams,
    terrain: Terrain,
    leg_settle_rad: f64,
    gust_sigma_n: f64,

    pos_m: Vector3<f64>,
    vel_mps: Vector3<f64>,
    q_bn: UnitQuaternion<f64>,
    omega_b_rps: Vector3<f64>,

    command: ActuationCommand,
    contact: Option<ContactTag>,
    events: Vec<ContactEvent>,
    rng: ChaCha8Rng,
}

impl SimulatedVehicle {
    pub fn new(cfg: &SimConfig, pad: Vector3<f64>, seed: u64) -> Self {
        Self {
            params: VehicleParams::from_config(cfg),
            terrain: Terrain::new(cfg, pad),
            leg_settle_rad: cfg.leg_settle_deg.to_radians(),
            gust_sigma_n: cfg.wind_gust_sigma_n,
            pos_m: pad,
            vel_mps: Vector3::zeros(),
            q_bn: UnitQuaternion::identity(),
            omega_b_rps: Vector3::zeros(),
            command: ActuationCommand::default(),
            contact: None,
            events: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0x6057_u64),
        }
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    pub fn altitude_m(&self) -> f64 {
        self.pos_m.y - self.terrain.ground_height_m
    }

    /// Integrate one fixed step with the last applied actuation.
    pub fn step(&mut self, dt_s: f64) {
        let force_b = self.command.thrust_force_body();
        let arm_b = Vector3::new(0.0, -self.params.engine_offset_m, 0.0);
        let torque_b = arm_b.cross(&force_b);

        let gust_n = if self.gust_sigma_n > 0.0 {
            Vector3::new(self.gaussian(self.gust_sigma_n), 0.0, self.gaussian(self.gust_sigma_n))
        } else {
            Vector3::zeros()
        };

        let gravity_n = Vector3::new(0.0, -self.params.gravity_mps2, 0.0);
        let acc_n = (self.q_bn.transform_vector(&force_b) + gust_n) / self.params.mass_kg + gravity_n;
        self.vel_mps += acc_n * dt_s;
        self.pos_m += self.vel_mps * dt_s;

        let coriolis = self
            .omega_b_rps
            .cross(&(self.params.inertia_kgm2 * self.omega_b_rps));
        let omega_dot = self.params.inertia_inv_kgm2 * (torque_b - coriolis);
        self.omega_b_rps += omega_dot * dt_s;
        self.omega_b_rps *= (1.0 - self.params.angular_damping * dt_s).max(0.0);

        let dq = UnitQuaternion::from_scaled_axis(self.omega_b_rps * dt_s);
        self.q_bn *= dq;

        self.resolve_ground();
    }

    fn resolve_ground(&mut self) {
        let ground = self.terrain.ground_height_m;
        if self.pos_m.y <= ground && self.terrain.covers(&self.pos_m) {
            self.pos_m.y = ground;
            self.vel_mps = Vector3::zeros();
            self.omega_b_rps = Vector3::zeros();
            self.settle_legs();

            if self.contact.is_none() {
                let tag = self.terrain.surface_tag(&self.pos_m);
                self.events.push(ContactEvent::Begin(tag.clone()));
                self.contact = Some(tag);
            }
        } else if self.pos_m.y > ground + LIFTOFF_CLEARANCE_M {
            if let Some(tag) = self.contact.take() {
                self.events.push(ContactEvent::End(tag));
            }
        }
    }

    fn settle_legs(&mut self) {
        let up_n = self.q_bn.transform_vector(&Vector3::y());
        if up_n.angle(&Vector3::y()) > self.leg_settle_rad {
            return;
        }
        if let Some(level) = UnitQuaternion::rotation_between(&up_n, &Vector3::y()) {
            self.q_bn = level * self.q_bn;
        }
    }

    fn gaussian(&mut self, sigma: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        sigma * z
    }
}

impl PhysicsBackend for SimulatedVehicle {
    fn position(&self) -> Vector3<f64> {
        self.pos_m
    }

    fn orientation_degrees(&self) -> Vector3<f64> {
        euler_degrees(&self.q_bn)
    }

    fn linear_velocity(&self) -> Vector3<f64> {
        self.vel_mps
    }

    fn angular_velocity(&self) -> Vector3<f64> {
        self.q_bn.transform_vector(&self.omega_b_rps)
    }

    fn raycast_down(&self) -> Option<f64> {
        if !self.terrain.covers(&self.pos_m) {
            return None;
        }
        let h = self.altitude_m();
        (0.0..=self.terrain.ray_length_m).contains(&h).then_some(h)
    }

    fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.events)
    }

    fn apply_actuation(&mut self, command: &ActuationCommand) {
        self.command = *command;
    }

    fn reset_to(&mut self, start: &StartState) {
        self.pos_m = start.position;
        self.vel_mps = Vector3::zeros();
        self.q_bn = quaternion_from_euler_degrees(start.orientation.degrees());
        self.omega_b_rps = Vector3::zeros();
        self.command = ActuationCommand::default();
        self.contact = None;
        self.events.clear();
    }
}
