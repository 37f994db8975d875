use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use touchdown::{ControlVector, Observation, Policy};

use crate::config::PolicyKind;

/// Signed view of a [0, 360) angle, in (-180, 180].
fn signed_degrees(angle: f64) -> f64 {
    if angle > 180.0 {
        angle - 360.0
    } else {
        angle
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdlePolicy;

impl Policy for IdlePolicy {
    fn act(&mut self, _observation: &Observation) -> ControlVector {
        ControlVector::new(0.0, 0.0, 0.0)
    }
}

pub struct RandomPolicy {
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0xACE5_u64),
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, _observation: &Observation) -> ControlVector {
        ControlVector::new(
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(0.0..=1.0),
        )
    }
}

/// Hover-trimmed descent-rate tracker with attitude damping.
///
/// The commanded sink rate shrinks with altitude so the vehicle meets the
/// ground at `touchdown_speed_mps`.
#[derive(Debug, Clone)]
pub struct DescentPolicy {
    pub hover_fraction: f64,
    pub sink_rate_gain: f64,
    pub max_sink_rate_mps: f64,
    pub touchdown_speed_mps: f64,
    pub throttle_gain: f64,
    pub attitude_gain: f64,
    pub rate_gain: f64,
}

impl DescentPolicy {
    pub fn new(hover_fraction: f64) -> Self {
        Self {
            hover_fraction,
            sink_rate_gain: 0.2,
            max_sink_rate_mps: 60.0,
            touchdown_speed_mps: 1.0,
            throttle_gain: 0.3,
            attitude_gain: 0.04,
            rate_gain: 0.8,
        }
    }

    fn target_vertical_speed(&self, ground_distance: f64) -> f64 {
        if ground_distance < 0.0 {
            return -self.max_sink_rate_mps;
        }
        -(self.sink_rate_gain * ground_distance).clamp(self.touchdown_speed_mps, self.max_sink_rate_mps)
    }
}

impl Policy for DescentPolicy {
    fn act(&mut self, observation: &Observation) -> ControlVector {
        let obs = observation.as_slice();
        let pitch = signed_degrees(obs[Observation::ORIENTATION]);
        let roll = signed_degrees(obs[Observation::ORIENTATION + 2]);
        let vertical_speed = obs[Observation::LINEAR_VELOCITY + 1];
        let pitch_rate = obs[Observation::ANGULAR_VELOCITY];
        let roll_rate = obs[Observation::ANGULAR_VELOCITY + 2];

        let target = self.target_vertical_speed(obs[Observation::GROUND_DISTANCE]);
        let thrust = self.hover_fraction + self.throttle_gain * (target - vertical_speed);

        // Positive gimbal deflection drives a negative body rate.
        let gimbal_x = self.attitude_gain * pitch + self.rate_gain * pitch_rate;
        let gimbal_z = self.attitude_gain * roll + self.rate_gain * roll_rate;

        ControlVector::new(gimbal_x.clamp(-1.0, 1.0), gimbal_z.clamp(-1.0, 1.0), thrust.clamp(0.0, 1.0))
    }
}

pub fn build_policy(kind: PolicyKind, hover_fraction: f64, seed: u64) -> Box<dyn Policy + Send> {
    match kind {
        PolicyKind::Idle => Box::new(IdlePolicy),
        PolicyKind::Random => Box::new(RandomPolicy::new(seed)),
        PolicyKind::Descent => Box::new(DescentPolicy::new(hover_fraction)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use touchdown::observation::OBSERVATION_SIZE;

    fn observation(pitch: f64, roll: f64, vertical_speed: f64, ground_distance: f64) -> Observation {
        let mut values = [0.0; OBSERVATION_SIZE];
        values[Observation::ORIENTATION] = pitch;
        values[Observation::ORIENTATION + 2] = roll;
        values[Observation::LINEAR_VELOCITY + 1] = vertical_speed;
        values[Observation::GROUND_DISTANCE] = ground_distance;
        Observation(values)
    }

    #[test]
    fn descent_coasts_high_up_and_brakes_near_the_ground() {
        let mut policy = DescentPolicy::new(0.4);
        let high = policy.act(&observation(0.0, 0.0, 0.0, 2_000.0));
        assert_eq!(high.thrust(), 0.0);

        let low = policy.act(&observation(0.0, 0.0, -30.0, 20.0));
        assert_eq!(low.thrust(), 1.0);

        let settled = policy.act(&observation(0.0, 0.0, -1.0, 2.0));
        assert!((settled.thrust() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn descent_counters_tilt_on_both_axes() {
        let mut policy = DescentPolicy::new(0.4);
        let nose_up = policy.act(&observation(10.0, 0.0, 0.0, 100.0));
        assert!(nose_up.gimbal_x() > 0.0);
        assert_eq!(nose_up.gimbal_z(), 0.0);

        let rolled = policy.act(&observation(0.0, 350.0, 0.0, 100.0));
        assert!(rolled.gimbal_z() < 0.0);
    }

    #[test]
    fn ray_miss_commands_full_sink_rate() {
        let policy = DescentPolicy::new(0.4);
        assert_eq!(policy.target_vertical_speed(-1.0), -60.0);
        assert_eq!(policy.target_vertical_speed(2.0), -1.0);
    }

    #[test]
    fn random_policy_is_reproducible_and_bounded() {
        let obs = observation(0.0, 0.0, 0.0, 10.0);
        let mut a = RandomPolicy::new(3);
        let mut b = RandomPolicy::new(3);
        for _ in 0..100 {
            let ca = a.act(&obs);
            assert_eq!(ca, b.act(&obs));
            assert!((-1.0..=1.0).contains(&ca.gimbal_x()));
            assert!((-1.0..=1.0).contains(&ca.gimbal_z()));
            assert!((0.0..=1.0).contains(&ca.thrust()));
        }
    }

    #[test]
    fn idle_policy_does_nothing() {
        let mut policy = build_policy(PolicyKind::Idle, 0.4, 0);
        assert_eq!(policy.act(&observation(45.0, 0.0, -10.0, 50.0)), ControlVector::new(0.0, 0.0, 0.0));
    }
}
