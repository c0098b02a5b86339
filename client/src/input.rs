//! Local avatar controls and the scripted input source that drives them

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::timing::frame_factor;
use shared::{Avatar, ROTATION_PER_SECOND, SPEED_STEP};
use std::time::Duration;

/// Controls held during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub accelerate: bool,
    pub brake: bool,
    pub fire: bool,
}

impl InputState {
    pub fn is_idle(&self) -> bool {
        *self == InputState::default()
    }
}

/// What the input did to the avatar this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Nothing changed; no frame needs to go out
    Idle,
    /// Heading or speed changed
    Steer,
    /// A shot was released
    Fire,
}

/// Anything that can produce controls once per tick
pub trait InputSource {
    fn poll(&mut self, elapsed: Duration) -> InputState;
}

/// Applies held controls to the avatar, scaled by elapsed time.
///
/// Firing is refused while the weapon is hot or reloading. Position is not
/// touched here; that is `Avatar::update`.
pub fn steer(avatar: &mut Avatar, input: &InputState, elapsed: Duration) -> Command {
    let factor = frame_factor(elapsed);
    let mut steered = false;

    if input.left != input.right {
        let turn = ROTATION_PER_SECOND * elapsed.as_secs_f32();
        avatar.rotation += if input.left { -turn } else { turn };
        steered = true;
    }

    if input.accelerate {
        avatar.speed += SPEED_STEP * factor;
        steered = true;
    }
    if input.brake {
        avatar.speed -= SPEED_STEP * factor;
        steered = true;
    }

    if input.fire && avatar.can_fire() {
        avatar.discharge();
        return Command::Fire;
    }

    if steered {
        Command::Steer
    } else {
        Command::Idle
    }
}

/// Random pilot for the headless client: holds a control set for a while, then picks another
pub struct Autopilot {
    rng: StdRng,
    current: InputState,
    remaining: Duration,
}

impl Autopilot {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            current: InputState::default(),
            remaining: Duration::ZERO,
        }
    }

    fn choose(&mut self) {
        let turn = self.rng.gen_range(0..3);
        self.current = InputState {
            left: turn == 1,
            right: turn == 2,
            accelerate: self.rng.gen_bool(0.35),
            brake: self.rng.gen_bool(0.15),
            fire: self.rng.gen_bool(0.3),
        };
        self.remaining = Duration::from_millis(self.rng.gen_range(200..1200));
    }
}

impl Default for Autopilot {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for Autopilot {
    fn poll(&mut self, elapsed: Duration) -> InputState {
        if self.remaining <= elapsed {
            self.choose();
        } else {
            self.remaining -= elapsed;
        }
        self.current
    }
}
