use grainfield::{
    dsp::FilterEffect, glam::Vec3, Actor, AudioClip, Collision, DiscardReason, Emitter,
    EmitterParameters, EmitterState, Engine, EngineConfig, Error, PlaybackCondition,
    SpeakerMixer, SpeakerState,
};

// -------------------------------------------------------------------------------------------------

const FRAME_RATE: f32 = 60.0;
const FRAME_SAMPLES: usize = 735;

fn init_logger() {
    let _ = simple_logger::init_with_level(log::Level::Warn);
}

fn test_clip() -> Result<AudioClip, Error> {
    let samples = (0..44100)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 44100.0).sin())
        .collect();
    AudioClip::from_mono(samples, 44100)
}

fn run_frames(engine: &mut Engine, mixer: &mut SpeakerMixer, count: usize) -> Vec<f32> {
    let mut output = vec![0.0; FRAME_SAMPLES * 2];
    let mut rendered = Vec::with_capacity(count * output.len());
    for _ in 0..count {
        engine.update(1.0 / FRAME_RATE);
        mixer.write(&mut output, 2);
        rendered.extend_from_slice(&output);
    }
    rendered
}

// -------------------------------------------------------------------------------------------------

#[test]
fn collision_bursts() -> Result<(), Error> {
    init_logger();
    let config = EngineConfig::default().with_burst_offset_range(0.0);
    let (mut engine, mut mixer) = Engine::new(config)?;
    engine.seed(1234);
    let events = engine.events();

    let clip = engine.add_clip(test_clip()?);
    let mut actor = Actor::at_position(Vec3::new(0.0, 0.0, -2.0));
    let host = engine.add_host(actor);
    // 200 ms bursts of 20 grains per second
    let parameters = EmitterParameters::new(1.0, 0.25, 30.0, 20.0, 0.0);
    let emitter = engine.add_emitter(
        host,
        Emitter::volatile(clip, PlaybackCondition::OnCollision, parameters, 200.0)
            .with_effect(FilterEffect::default())?,
    )?;

    // silent without collisions
    let output = run_frames(&mut engine, &mut mixer, 10);
    assert_eq!(engine.statistics().total_delivered(), 0);
    assert!(output.iter().all(|s| *s == 0.0));
    assert_eq!(engine.host_speaker(host), Some(0));

    actor.last_collision = Some(Collision::new(1, Vec3::new(0.0, -3.0, 0.0), Vec3::Y));
    engine.update_actor(host, actor)?;
    let output = run_frames(&mut engine, &mut mixer, 30);
    assert_eq!(engine.statistics().total_delivered(), 4);
    assert_eq!(
        engine.emitter(emitter).map(|e| e.state()),
        Some(EmitterState::Idle)
    );
    assert!(output.iter().any(|s| s.abs() > 0.01));

    // the same collision does not retrigger
    run_frames(&mut engine, &mut mixer, 30);
    assert_eq!(engine.statistics().total_delivered(), 4);

    actor.last_collision = Some(Collision::new(2, Vec3::new(0.0, -1.0, 0.0), Vec3::Y));
    engine.update_actor(host, actor)?;
    run_frames(&mut engine, &mut mixer, 30);
    assert_eq!(engine.statistics().total_delivered(), 8);

    let played = events.try_iter().collect::<Vec<_>>();
    assert_eq!(played.len(), 8);
    assert!(played.iter().all(|e| e.grain.emitter == emitter && e.speaker == 0));
    assert!(played
        .windows(2)
        .all(|pair| pair[0].grain.dsp_start < pair[1].grain.dsp_start));
    Ok(())
}

#[test]
fn inaudible_hosts() -> Result<(), Error> {
    init_logger();
    let config = EngineConfig::default().with_listener_radius(10.0);
    let (mut engine, mut mixer) = Engine::new(config)?;
    let clip = engine.add_clip(test_clip()?);
    let far = engine.add_host(Actor::at_position(Vec3::new(100.0, 0.0, 0.0)));
    engine.add_emitter(
        far,
        Emitter::stable(clip, PlaybackCondition::Constant, EmitterParameters::default()),
    )?;

    let output = run_frames(&mut engine, &mut mixer, 20);
    assert_eq!(engine.host_speaker(far), None);
    assert_eq!(engine.speakers().active_count(), 0);
    assert_eq!(engine.statistics().total_delivered(), 0);
    assert!(output.iter().all(|s| *s == 0.0));

    // moving the listener close to the host makes it audible
    engine.set_listener(Vec3::new(95.0, 0.0, 0.0), Default::default());
    run_frames(&mut engine, &mut mixer, 20);
    assert!(engine.host_speaker(far).is_some());
    assert!(engine.statistics().total_delivered() > 0);
    Ok(())
}

#[test]
fn speaker_life_cycle() -> Result<(), Error> {
    init_logger();
    let config = EngineConfig::default()
        .with_speaker_linger(100.0)
        .with_speaker_population_interval(0.0);
    let (mut engine, mut mixer) = Engine::new(config)?;
    let clip = engine.add_clip(test_clip()?);
    let host = engine.add_host(Actor::at_position(Vec3::new(1.0, 0.0, 0.0)));
    let parameters = EmitterParameters::new(0.5, 0.5, 40.0, 30.0, 0.0);
    let emitter = engine.add_emitter(
        host,
        Emitter::stable(clip, PlaybackCondition::Constant, parameters),
    )?;

    run_frames(&mut engine, &mut mixer, 30);
    let speaker = engine.host_speaker(host);
    assert_eq!(speaker, Some(0));
    assert_eq!(mixer.speaker_count(), 1);
    let stats = engine.statistics();
    assert!(stats.total_delivered() > 0);
    assert_eq!(stats.total_discarded(DiscardReason::NoSpeaker), 0);
    assert_eq!(stats.total_discarded(DiscardReason::PoolFull), 0);

    // without emitters, the speaker lingers and then returns to the pool
    engine.remove_emitter(emitter)?;
    engine.remove_host(host)?;
    run_frames(&mut engine, &mut mixer, 2);
    assert_eq!(
        engine.speakers().speaker(0).map(|s| s.state()),
        Some(SpeakerState::Lingering)
    );
    run_frames(&mut engine, &mut mixer, 30);
    assert_eq!(
        engine.speakers().speaker(0).map(|s| s.state()),
        Some(SpeakerState::Pooled)
    );
    assert_eq!(mixer.speaker_count(), 0);
    Ok(())
}

#[test]
fn recreated_speakers_keep_their_grains() -> Result<(), Error> {
    init_logger();
    let config = EngineConfig::default().with_max_speakers(1);
    let (mut engine, mut mixer) = Engine::new(config)?;
    let mut output = vec![0.0; FRAME_SAMPLES * 2];

    assert_eq!(engine.speakers_mut().create_speaker(Vec3::ZERO).ok(), Some(0));
    mixer.write(&mut output, 2);
    assert_eq!(mixer.speaker_count(), 1);

    // the removal is pending until the mixer ran, so the speaker can't be reused yet
    engine.speakers_mut().destroy_speaker(0)?;
    assert!(engine.speakers_mut().create_speaker(Vec3::ZERO).is_err());
    mixer.write(&mut output, 2);
    assert_eq!(mixer.speaker_count(), 0);

    assert_eq!(engine.speakers_mut().create_speaker(Vec3::ZERO).ok(), Some(0));
    let speaker = engine.speakers().speaker(0).ok_or(Error::SpeakerNotFound(0))?;
    speaker.output().set_gain(1.0);
    assert!(speaker.publish(&[1.0; 16], mixer.sample_position()));
    mixer.write(&mut output, 2);
    assert_eq!(mixer.speaker_count(), 1);
    let energy = output.iter().map(|s| s * s).sum::<f32>();
    assert!(energy > 0.0);
    Ok(())
}
