//! A bouncing ball and an orbiting drone, rendered by the granular engine on the default audio
//! output device.

use std::time::{Duration, Instant};

use grainfield::{
    dsp::{ChopperEffect, FilterEffect, FlangeEffect},
    glam::Vec3,
    modulation::{ActorInput, CollisionInput, ModulationInput, ModulationSource},
    utils::dsp::filters::biquad::BiquadFilterType,
    Actor, AudioClip, Collision, DefaultOutputDevice, Emitter, EmitterParameters, Engine,
    EngineConfig, Error, OutputDevice, PlaybackCondition, WindowConfig, WindowFunction,
};

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

// Scene parameters (tweak as needed!)

const FRAME_RATE: f32 = 60.0;
const PLAY_TIME: Duration = Duration::from_secs(12);

const GRAVITY: f32 = -9.81;
const BALL_START_HEIGHT: f32 = 4.0;
const BALL_RESTITUTION: f32 = 0.8; // bounce energy kept per collision

const DRONE_RADIUS: f32 = 6.0;
const DRONE_SPEED: f32 = 0.6; // radians per second

// -------------------------------------------------------------------------------------------------

/// A few seconds of a detuned saw pad as grain source.
fn pad_clip(sample_rate: u32) -> Result<AudioClip, Error> {
    let samples = (0..sample_rate * 4)
        .map(|i| {
            let time = i as f32 / sample_rate as f32;
            [110.0, 110.7, 164.8]
                .iter()
                .map(|frequency| 2.0 * (time * frequency).fract() - 1.0)
                .sum::<f32>()
                * 0.2
        })
        .collect();
    AudioClip::from_mono(samples, sample_rate)
}

/// A short decaying noise burst as grain source for impacts.
fn impact_clip(sample_rate: u32) -> Result<AudioClip, Error> {
    let mut seed = 0x1234_5678_u32;
    let samples = (0..sample_rate / 2)
        .map(|i| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let noise = seed as f32 / u32::MAX as f32 * 2.0 - 1.0;
            noise * (-(i as f32) / (sample_rate as f32 * 0.05)).exp()
        })
        .collect();
    AudioClip::from_mono(samples, sample_rate)
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    let _ = simple_logger::init_with_level(log::Level::Info);

    let config = EngineConfig::default();
    let sample_rate = config.sample_rate;
    let (mut engine, mixer) = Engine::new(config)?;
    let mut output = DefaultOutputDevice::open(mixer)?;

    let pad = engine.add_clip(pad_clip(sample_rate)?);
    let impact = engine.add_clip(impact_clip(sample_rate)?);

    // Drone: a stable emitter whose density and volume follow the host's speed
    let mut drone = Actor::at_position(Vec3::new(DRONE_RADIUS, 1.0, 0.0));
    let drone_host = engine.add_host(drone);
    let mut drone_parameters = EmitterParameters::new(0.5, 0.2, 120.0, 12.0, 0.0);
    drone_parameters.density = drone_parameters.density.with_input(
        ModulationInput::new(ModulationSource::Actor(ActorInput::Speed))
            .with_range(0.0, DRONE_RADIUS * DRONE_SPEED * 2.0)
            .with_smoothing(0.5)
            .with_amount(0.1),
    );
    drone_parameters.playhead = drone_parameters.playhead.with_end(0.8).with_noise(0.1);
    engine.add_emitter(
        drone_host,
        Emitter::stable(pad, PlaybackCondition::Constant, drone_parameters)
            .with_window(WindowConfig::new(WindowFunction::Hann))
            .with_effect(FlangeEffect::default())?
            .with_effect(FilterEffect::new(BiquadFilterType::LowPass, 1200.0, 0.9))?,
    )?;

    // Ball: a volatile emitter which bursts on each collision, louder on harder impacts
    let mut ball = Actor::at_position(Vec3::new(0.0, BALL_START_HEIGHT, -2.0));
    let ball_host = engine.add_host(ball);
    let mut ball_parameters = EmitterParameters::new(0.3, 0.0, 30.0, 80.0, 0.0);
    ball_parameters.volume = ball_parameters.volume.with_input(
        ModulationInput::new(ModulationSource::Collision(CollisionInput::Impulse))
            .with_range(0.0, 10.0)
            .with_amount(0.8),
    );
    engine.add_emitter(
        ball_host,
        Emitter::volatile(impact, PlaybackCondition::OnCollision, ball_parameters, 150.0)
            .with_effect(ChopperEffect::default())?,
    )?;

    println!("Playing a bouncing ball and an orbiting drone...");

    let delta_time = 1.0 / FRAME_RATE;
    let frame_duration = Duration::from_secs_f32(delta_time);
    let started = Instant::now();
    let mut collision_id = 0;
    let mut scene_time = 0.0f32;
    while started.elapsed() < PLAY_TIME {
        let frame_start = Instant::now();
        scene_time += delta_time;

        // move the drone on a circle around the listener
        let angle = scene_time * DRONE_SPEED;
        let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * DRONE_RADIUS + Vec3::Y;
        drone.velocity = (position - drone.position) / delta_time;
        drone.position = position;
        engine.update_actor(drone_host, drone)?;

        // let the ball fall and bounce off the ground
        ball.velocity.y += GRAVITY * delta_time;
        ball.position += ball.velocity * delta_time;
        ball.is_colliding = false;
        if ball.position.y <= 0.0 && ball.velocity.y < 0.0 {
            collision_id += 1;
            let impact_velocity = ball.velocity;
            ball.position.y = 0.0;
            ball.velocity.y = -ball.velocity.y * BALL_RESTITUTION;
            ball.is_colliding = true;
            ball.last_collision = Some(Collision::new(
                collision_id,
                impact_velocity,
                Vec3::Y * impact_velocity.y.abs() * ball.mass,
            ));
            println!(
                "Bounce #{collision_id} at {:.1} m/s",
                impact_velocity.length()
            );
        }
        engine.update_actor(ball_host, ball)?;

        engine.update(delta_time);

        std::thread::sleep(frame_duration.saturating_sub(frame_start.elapsed()));
    }

    let stats = engine.statistics();
    println!(
        "Delivered {} grains, {:.1} grains per second",
        stats.total_delivered(),
        stats.grains_per_second()
    );

    output.close();
    Ok(())
}
