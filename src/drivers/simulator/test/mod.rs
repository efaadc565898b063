use crate as dali;
use dali::codec::event::CodecEvent;
use dali::config::GearConfig;
use dali::defs::gear::cmd;
use dali::defs::gear::status;
use dali::drivers::simulator::memory_banks::SimMemoryBanks;
use dali::drivers::simulator::output::{SimBusPower, SimOutput};
use dali::drivers::simulator::params::MemoryParameterStore;
use dali::drivers::simulator::runtime::{GearRuntime, SimHardware};
use dali::drivers::simulator::scheduler::ManualScheduler;
use dali::drivers::simulator::transceiver::LoopbackTransceiver;
use dali::gear::hal::{GearIo, ParamId, Scheduler, TimerId};
use dali::gear::handler::{GearEngine, GearEvent};
use dali::gear::state::{Identity, MsgState, PhysicalSelection};
use futures::stream::StreamExt;
use std::time::Duration;

const S5: u8 = 0x0b; // Short address 5, command
const S5_LEVEL: u8 = 0x0a;
const BROADCAST: u8 = 0xff;

/// One gear with deterministic timers. The test acts as codec and bus.
struct Bench {
    engine: GearEngine,
    params: MemoryParameterStore,
    output: SimOutput,
    bus: SimBusPower,
    clock: ManualScheduler,
    xcvr: LoopbackTransceiver,
}

impl Bench {
    fn new(config: GearConfig, setup: impl FnOnce(&MemoryParameterStore)) -> Bench {
        let params = MemoryParameterStore::new(config.identity.clone());
        setup(&params);
        let output = SimOutput::new();
        let bus = SimBusPower::new(true);
        let clock = ManualScheduler::new();
        let xcvr = LoopbackTransceiver::new();
        let io = GearIo {
            params: Box::new(params.clone()),
            output: Box::new(output.clone()),
            scheduler: Box::new(clock.clone()),
            bus: Box::new(bus.clone()),
            memory: Box::new(SimMemoryBanks::new(config.serial_number)),
            transceiver: Box::new(xcvr.clone()),
            timers: config.timers.clone(),
        };
        let mut engine = GearEngine::new(config, io);
        engine.enable();
        Bench {
            engine,
            params,
            output,
            bus,
            clock,
            xcvr,
        }
    }

    /// Gear at short address 5 with physical minimum 1
    fn short5() -> Bench {
        Bench::new(low_min_config(), |p| {
            p.preset(ParamId::ShortAddress, 5);
            p.preset(ParamId::MinLevel, 1);
        })
    }

    /// Let time pass, handling timer expiry and transmissions. Returns the
    /// last byte the gear sent.
    fn advance(&mut self, time: Duration) -> Option<u8> {
        for ev in self.clock.advance(time) {
            self.engine.process_event(ev);
        }
        let mut answer = None;
        for bytes in self.xcvr.take_transmitted() {
            answer = bytes.first().copied();
            self.engine
                .process_event(GearEvent::Codec(CodecEvent::XmitDone));
        }
        answer
    }

    /// Deliver a forward frame and wait for a possible answer
    fn frame(&mut self, addr: u8, data: u8) -> Option<u8> {
        self.engine
            .process_event(GearEvent::Codec(CodecEvent::RecvDone(vec![addr, data])));
        self.advance(Duration::from_millis(3))
    }

    fn twice(&mut self, addr: u8, data: u8) {
        self.frame(addr, data);
        self.frame(addr, data);
    }

    fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.engine.fade_tick();
        }
    }

    fn actual(&self) -> u8 {
        self.engine.state().actual_level
    }
}

fn low_min_config() -> GearConfig {
    GearConfig {
        identity: Identity {
            physical_min_level: 1,
            ..Identity::default()
        },
        ..GearConfig::default()
    }
}

#[test]
fn direct_level_fades_to_target() {
    let mut b = Bench::new(low_min_config(), |p| {
        p.preset(ParamId::ShortAddress, 5);
        p.preset(ParamId::MinLevel, 1);
        p.preset(ParamId::FadeTime, 4);
    });
    assert_eq!(b.actual(), 254);
    assert_eq!(b.xcvr.listening(), Some(2));

    assert_eq!(b.frame(S5_LEVEL, 0x80), None);
    assert_eq!(b.engine.state().requested_level, 128);
    assert!(b.engine.state().status.fade_running);
    b.ticks(2500);
    assert_eq!(b.actual(), 128);
    assert!(!b.engine.state().status.fade_running);
    assert_eq!(b.params.value(ParamId::LastRequestedLevel), Some(128));
    assert_eq!(b.frame(S5, cmd::QUERY_ACTUAL_LEVEL), Some(128));
    assert!(b.output.level().is_some());
}

#[test]
fn other_addresses_are_ignored() {
    let mut b = Bench::short5();
    assert_eq!(b.frame(0x0d, cmd::QUERY_CONTROL_GEAR_PRESENT), None);
    assert_eq!(b.frame(0x81, cmd::QUERY_CONTROL_GEAR_PRESENT), None);
    assert_eq!(b.frame(S5, cmd::QUERY_CONTROL_GEAR_PRESENT), Some(cmd::YES));
    assert_eq!(
        b.frame(BROADCAST, cmd::QUERY_CONTROL_GEAR_PRESENT),
        Some(cmd::YES)
    );
    // Group 3
    b.twice(S5, cmd::ADD_TO_GROUP + 3);
    assert_eq!(b.frame(0x87, cmd::QUERY_CONTROL_GEAR_PRESENT), Some(cmd::YES));
    assert_eq!(b.frame(S5, cmd::QUERY_GROUPS_0_7), Some(0x08));
    assert_eq!(b.params.value(ParamId::Group0_7), Some(0x08));
    b.twice(S5, cmd::REMOVE_FROM_GROUP + 3);
    assert_eq!(b.frame(0x87, cmd::QUERY_CONTROL_GEAR_PRESENT), None);
}

#[test]
fn config_command_needs_repeat() {
    let mut b = Bench::short5();
    b.frame(cmd::DTR, 100);

    // Once
    b.frame(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    assert!(b.clock.is_running(TimerId::RepeatWindow));
    b.advance(Duration::from_millis(150));
    assert!(!b.engine.state().flags.repeat_timer_requested);
    assert_eq!(b.engine.state().params.max_level, 254);

    // Twice
    b.twice(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    assert_eq!(b.engine.state().params.max_level, 100);
    assert_eq!(b.params.value(ParamId::MaxLevel), Some(100));
    assert!(!b.clock.is_running(TimerId::RepeatWindow));
    assert_eq!(b.actual(), 100);

    // Two different commands
    b.frame(cmd::DTR, 50);
    b.frame(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    b.frame(S5, cmd::STORE_DTR_AS_MIN_LEVEL);
    assert_eq!(b.engine.state().params.max_level, 100);
    assert_eq!(b.engine.state().params.min_level, 1);
    assert!(!b.clock.is_running(TimerId::RepeatWindow));
    assert!(!b.engine.state().flags.repeat_timer_requested);

    // Too slow
    b.frame(S5, cmd::STORE_DTR_AS_MIN_LEVEL);
    b.advance(Duration::from_millis(120));
    b.frame(S5, cmd::STORE_DTR_AS_MIN_LEVEL);
    assert_eq!(b.engine.state().params.min_level, 1);
}

#[test]
fn other_command_ends_repeat() {
    let mut b = Bench::short5();
    b.frame(cmd::DTR, 100);
    b.frame(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    assert_eq!(b.frame(S5, cmd::QUERY_MAX_LEVEL), Some(254));
    assert!(!b.engine.state().flags.repeat_timer_requested);
    // Counts as a first arrival again
    b.frame(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    assert_eq!(b.engine.state().params.max_level, 254);
    b.frame(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    assert_eq!(b.engine.state().params.max_level, 100);
}

#[test]
fn forced_and_eol_skip_repeat() {
    let mut b = Bench::short5();
    b.frame(cmd::DTR, 60);
    assert!(b.engine.force_message(S5, cmd::STORE_DTR_AS_MAX_LEVEL));
    assert_eq!(b.engine.state().params.max_level, 60);
    assert!(!b.engine.state().flags.forced_message);

    b.output.set_eol_test(true);
    b.frame(cmd::DTR, 70);
    b.frame(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    assert_eq!(b.engine.state().params.max_level, 70);

    b.engine.disable();
    assert!(!b.engine.force_message(S5, cmd::OFF));
}

#[test]
fn level_limits() {
    let mut b = Bench::new(GearConfig::default(), |p| {
        p.preset(ParamId::ShortAddress, 5);
    });
    assert_eq!(b.engine.state().params.min_level, 25);

    b.frame(cmd::DTR, 10);
    b.twice(S5, cmd::STORE_DTR_AS_MIN_LEVEL);
    assert_eq!(b.engine.state().params.min_level, 25);

    b.frame(cmd::DTR, 60);
    b.twice(S5, cmd::STORE_DTR_AS_MIN_LEVEL);
    b.frame(cmd::DTR, 40);
    b.twice(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    assert_eq!(b.frame(S5, cmd::QUERY_MAX_LEVEL), Some(60));

    b.frame(cmd::DTR, 0xff);
    b.twice(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    assert_eq!(b.frame(S5, cmd::QUERY_MAX_LEVEL), Some(0xfe));
    b.twice(S5, cmd::STORE_DTR_AS_MIN_LEVEL);
    assert_eq!(b.frame(S5, cmd::QUERY_MIN_LEVEL), Some(0xfe));

    // Requests outside the range are clamped
    b.frame(cmd::DTR, 100);
    b.twice(S5, cmd::STORE_DTR_AS_MIN_LEVEL);
    b.frame(S5_LEVEL, 30);
    assert_eq!(b.actual(), 100);
    assert!(b.engine.state().status.limit_error);
    assert_eq!(b.frame(S5, cmd::QUERY_LIMIT_ERROR), Some(cmd::YES));
    b.frame(S5, cmd::RECALL_MAX_LEVEL);
    assert_eq!(b.actual(), 0xfe);
    assert_eq!(b.frame(S5, cmd::QUERY_LIMIT_ERROR), None);
}

#[test]
fn step_commands() {
    let mut b = Bench::short5();
    b.frame(S5, cmd::RECALL_MIN_LEVEL);
    assert_eq!(b.actual(), 1);
    b.frame(S5, cmd::STEP_UP);
    assert_eq!(b.actual(), 2);
    b.frame(S5, cmd::STEP_DOWN_AND_OFF);
    b.frame(S5, cmd::STEP_DOWN_AND_OFF);
    assert_eq!(b.actual(), 0);
    b.frame(S5, cmd::STEP_UP);
    assert_eq!(b.actual(), 0);
    b.frame(S5, cmd::ON_AND_STEP_UP);
    assert_eq!(b.actual(), 1);
    b.frame(S5, cmd::ON_AND_STEP_UP);
    assert_eq!(b.actual(), 2);
    b.frame(S5, cmd::OFF);
    b.ticks(1);
    assert_eq!(b.frame(S5, cmd::QUERY_LAMP_POWER_ON), None);
    b.frame(S5, cmd::RECALL_MAX_LEVEL);
    b.ticks(1);
    assert_eq!(b.frame(S5, cmd::QUERY_LAMP_POWER_ON), Some(cmd::YES));
    b.frame(S5, cmd::STEP_DOWN);
    assert_eq!(b.actual(), 253);
}

#[test]
fn up_ramps_at_fade_rate() {
    let mut b = Bench::short5();
    b.frame(S5_LEVEL, 100);
    b.frame(S5, cmd::UP);
    assert!(b.engine.state().status.fade_running);
    b.ticks(200);
    assert!(!b.engine.state().status.fade_running);
    let level = b.actual();
    // Fade rate 7 is about 45 steps per second
    assert!((108..=110).contains(&level), "level {}", level);
}

#[test]
fn dapc_sequence() {
    let mut b = Bench::new(low_min_config(), |p| {
        p.preset(ParamId::ShortAddress, 5);
        p.preset(ParamId::MinLevel, 1);
        p.preset(ParamId::FadeTime, 7);
    });
    b.frame(S5, cmd::ENABLE_DAPC_SEQUENCE);
    assert!(b.engine.state().flags.dapc_sequence_running);
    assert_eq!(b.engine.state().params.fade_time, 1);
    assert!(b.clock.is_running(TimerId::DapcSequence));
    b.frame(S5_LEVEL, 200);
    b.advance(Duration::from_millis(150));
    b.frame(S5_LEVEL, 180);
    // Restarted by the second level
    b.advance(Duration::from_millis(150));
    assert!(b.engine.state().flags.dapc_sequence_running);
    b.advance(Duration::from_millis(100));
    assert!(!b.engine.state().flags.dapc_sequence_running);
    assert_eq!(b.engine.state().params.fade_time, 7);

    // A command ends the sequence at once
    b.frame(S5, cmd::ENABLE_DAPC_SEQUENCE);
    b.frame(S5, cmd::RECALL_MIN_LEVEL);
    assert!(!b.engine.state().flags.dapc_sequence_running);
    assert!(!b.clock.is_running(TimerId::DapcSequence));
    assert_eq!(b.engine.state().params.fade_time, 7);
}

#[test]
fn scenes() {
    let mut b = Bench::short5();
    b.frame(cmd::DTR, 80);
    b.twice(S5, cmd::STORE_DTR_AS_SCENE + 3);
    assert_eq!(b.params.value(ParamId::Scene(3)), Some(80));
    assert_eq!(b.frame(S5, cmd::QUERY_SCENE_LEVEL + 3), Some(80));

    b.frame(S5, cmd::GO_TO_SCENE + 3);
    assert_eq!(b.actual(), 80);
    // Scene 4 is not set
    b.frame(S5, cmd::GO_TO_SCENE + 4);
    assert_eq!(b.actual(), 80);
    assert_eq!(b.engine.state().requested_level, 80);

    b.twice(S5, cmd::REMOVE_FROM_SCENE + 3);
    assert_eq!(b.frame(S5, cmd::QUERY_SCENE_LEVEL + 3), Some(0xff));
    b.frame(S5_LEVEL, 30);
    b.frame(S5, cmd::GO_TO_SCENE + 3);
    assert_eq!(b.actual(), 30);
}

#[test]
fn reset_restores_defaults() {
    let mut b = Bench::short5();
    b.frame(cmd::DTR, 80);
    b.twice(S5, cmd::STORE_DTR_AS_SCENE + 1);
    b.twice(S5, cmd::STORE_DTR_AS_MAX_LEVEL);
    b.twice(S5, cmd::ADD_TO_GROUP + 9);
    b.frame(S5_LEVEL, 50);
    assert_eq!(b.frame(S5, cmd::QUERY_RESET_STATE), None);

    b.twice(S5, cmd::RESET);
    let st = b.engine.state();
    assert_eq!(st.params.max_level, 254);
    assert_eq!(st.params.scenes[1], 0xff);
    assert_eq!(st.params.groups, 0);
    assert_eq!(st.params.short_address, 5);
    assert_eq!(st.actual_level, 254);
    assert_eq!(st.msg_state, MsgState::Idle);
    assert!(!st.flags.reset_requested);
    assert!(!st.status.power_failure);
    assert_eq!(b.params.value(ParamId::Scene(1)), Some(0xff));
    assert_eq!(b.frame(S5, cmd::QUERY_RESET_STATE), Some(cmd::YES));
    let s = b.frame(S5, cmd::QUERY_STATUS).unwrap();
    assert_eq!(s & status::RESET_STATE, status::RESET_STATE);
}

#[test]
fn power_failure_until_level_command() {
    let mut b = Bench::short5();
    assert_eq!(b.frame(S5, cmd::QUERY_POWER_FAILURE), Some(cmd::YES));
    let s = b.frame(S5, cmd::QUERY_STATUS).unwrap();
    assert_eq!(s & status::POWER_FAILURE, status::POWER_FAILURE);
    // Queries don't count
    assert_eq!(b.frame(S5, cmd::QUERY_POWER_FAILURE), Some(cmd::YES));
    b.frame(S5, cmd::RECALL_MAX_LEVEL);
    assert_eq!(b.frame(S5, cmd::QUERY_POWER_FAILURE), None);
}

#[test]
fn missing_short_address() {
    let mut b = Bench::new(low_min_config(), |_| {});
    assert_eq!(
        b.frame(BROADCAST, cmd::QUERY_MISSING_SHORT_ADDRESS),
        Some(cmd::YES)
    );
    b.frame(cmd::DTR, 0x15);
    b.twice(BROADCAST, cmd::STORE_DTR_AS_SHORT_ADDRESS);
    assert_eq!(b.engine.state().params.short_address, 0x0a);
    assert_eq!(b.frame(0x15, cmd::QUERY_MISSING_SHORT_ADDRESS), None);
    // Not a valid address byte
    b.frame(cmd::DTR, 0x14);
    b.twice(BROADCAST, cmd::STORE_DTR_AS_SHORT_ADDRESS);
    assert_eq!(b.params.value(ParamId::ShortAddress), Some(0x0a));
}

#[test]
fn failed_store_write_is_dropped() {
    let mut b = Bench::short5();
    b.params.fail_put(ParamId::FadeTime);
    b.frame(cmd::DTR, 5);
    b.twice(S5, cmd::STORE_DTR_AS_FADE_TIME);
    assert_eq!(b.params.value(ParamId::FadeTime), Some(0));
    assert_eq!(b.engine.state().msg_state, MsgState::Idle);
    assert_eq!(b.frame(S5, cmd::QUERY_CONTROL_GEAR_PRESENT), Some(cmd::YES));
}

#[test]
fn fade_settings() {
    let mut b = Bench::short5();
    b.frame(cmd::DTR, 20);
    b.twice(S5, cmd::STORE_DTR_AS_FADE_TIME);
    b.frame(cmd::DTR, 0);
    b.twice(S5, cmd::STORE_DTR_AS_FADE_RATE);
    assert_eq!(b.frame(S5, cmd::QUERY_FADE), Some(0xf1));
    b.frame(cmd::DTR, 3);
    b.twice(S5, cmd::STORE_DTR_AS_FADE_TIME);
    assert_eq!(b.frame(S5, cmd::QUERY_FADE), Some(0x31));
}

#[test]
fn device_type_commands() {
    let mut b = Bench::short5();
    assert_eq!(b.frame(S5, cmd::QUERY_EXTENDED_VERSION_NUMBER), None);
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    assert_eq!(b.frame(S5, cmd::QUERY_EXTENDED_VERSION_NUMBER), Some(1));
    // Only the next command
    assert_eq!(b.frame(S5, cmd::QUERY_GEAR_TYPE), None);

    // Wrong device type
    b.frame(cmd::ENABLE_DEVICE_TYPE, 8);
    assert_eq!(b.frame(S5, cmd::QUERY_GEAR_TYPE), None);

    // A special command after ENABLE DEVICE TYPE is ignored
    b.frame(cmd::DTR, 1);
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    b.frame(cmd::DTR, 9);
    assert_eq!(b.frame(S5, cmd::QUERY_CONTENT_DTR), Some(1));

    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    b.twice(S5, cmd::SELECT_DIMMING_CURVE);
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    assert_eq!(b.frame(S5, cmd::QUERY_DIMMING_CURVE), Some(1));
    assert_eq!(b.params.value(ParamId::OperatingMode), Some(0x10));
    b.ticks(1);
    assert_eq!(b.output.level().map(|(c, _)| c), Some(dali::gear::hal::DimmingCurve::Linear));

    b.frame(cmd::DTR, 40);
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    b.twice(S5, cmd::STORE_DTR_AS_FAST_FADE_TIME);
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    assert_eq!(b.frame(S5, cmd::QUERY_FAST_FADE_TIME), Some(27));

    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    b.twice(S5, cmd::ENABLE_CURRENT_PROTECTOR);
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    assert_eq!(
        b.frame(S5, cmd::QUERY_CURRENT_PROTECTOR_ENABLED),
        Some(cmd::YES)
    );
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    assert_eq!(b.frame(S5, cmd::QUERY_FAILURE_STATUS), Some(0));
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    assert_eq!(b.frame(S5, cmd::QUERY_SHORT_CIRCUIT), None);

    // Used up by a frame for another gear or a level frame
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    assert_eq!(b.frame(0x0f, cmd::QUERY_STATUS), None);
    assert_eq!(b.frame(S5, cmd::QUERY_GEAR_TYPE), None);
    b.frame(cmd::ENABLE_DEVICE_TYPE, 6);
    b.frame(S5_LEVEL, 100);
    assert!(!b.engine.state().flags.app_extended_requested);
    assert_eq!(b.frame(S5, cmd::QUERY_GEAR_TYPE), None);
}

#[test]
fn memory_banks() {
    let mut b = Bench::short5();
    // Serial number 0x0001e240 at bank 0 location 0x0b
    b.frame(cmd::DTR1, 0);
    b.frame(cmd::DTR, 0x0b);
    assert_eq!(b.frame(S5, cmd::READ_MEMORY_LOCATION), Some(0x00));
    assert_eq!(b.frame(S5, cmd::QUERY_CONTENT_DTR), Some(0x0c));
    assert_eq!(b.frame(S5, cmd::QUERY_CONTENT_DTR2), Some(0x01));
    assert_eq!(b.frame(S5, cmd::READ_MEMORY_LOCATION), Some(0x01));
    assert_eq!(b.frame(S5, cmd::READ_MEMORY_LOCATION), Some(0xe2));
    assert_eq!(b.frame(S5, cmd::READ_MEMORY_LOCATION), Some(0x40));
    // Past the end
    assert_eq!(b.frame(S5, cmd::READ_MEMORY_LOCATION), None);
    assert_eq!(b.frame(S5, cmd::QUERY_CONTENT_DTR), Some(0x0f));

    // Locked
    b.frame(cmd::DTR1, 1);
    b.frame(cmd::DTR, 4);
    b.twice(S5, cmd::ENABLE_WRITE_MEMORY);
    assert_eq!(b.frame(cmd::WRITE_MEMORY_LOCATION, 0x22), None);
    assert_eq!(b.engine.state().dtr, 5);

    b.frame(cmd::DTR, 2);
    b.twice(S5, cmd::ENABLE_WRITE_MEMORY);
    assert_eq!(b.frame(cmd::WRITE_MEMORY_LOCATION, 0x55), Some(0x55));
    assert_eq!(b.frame(cmd::WRITE_MEMORY_LOCATION, 0x99), Some(0x99));

    b.frame(cmd::DTR, 3);
    assert_eq!(b.frame(S5, cmd::READ_MEMORY_LOCATION), Some(0x99));
    // Any addressed command disables writing
    assert_eq!(b.frame(cmd::WRITE_MEMORY_LOCATION, 0x11), None);
    assert_eq!(b.engine.state().dtr, 4);
}

#[test]
fn bus_failure_once_per_outage() {
    let mut b = Bench::new(low_min_config(), |p| {
        p.preset(ParamId::MinLevel, 1);
        p.preset(ParamId::SystemFailureLevel, 100);
    });
    let samples = b.engine.config().timers.bus_fail_samples() as usize;
    assert_eq!(b.actual(), 254);

    b.bus.set(false);
    for _ in 0..samples - 1 {
        b.engine.periodic_bus_check();
    }
    assert_eq!(b.actual(), 254);
    b.engine.periodic_bus_check();
    assert_eq!(b.actual(), 100);
    let updates = b.output.updates();
    b.engine.state_mut().actual_level = 200;
    for _ in 0..3 * samples {
        b.engine.periodic_bus_check();
    }
    assert_eq!(b.actual(), 200);
    assert_eq!(b.output.updates(), updates);

    // Short glitches don't count
    b.bus.set(true);
    b.engine.periodic_bus_check();
    for _ in 0..3 {
        b.bus.set(false);
        for _ in 0..samples - 1 {
            b.engine.periodic_bus_check();
        }
        b.bus.set(true);
        b.engine.periodic_bus_check();
    }
    assert_eq!(b.actual(), 200);

    // Next outage
    b.bus.set(false);
    for _ in 0..samples {
        b.engine.periodic_bus_check();
    }
    assert_eq!(b.actual(), 100);
}

#[test]
fn waits_for_bus_power() {
    let config = low_min_config();
    let params = MemoryParameterStore::new(config.identity.clone());
    let bus = SimBusPower::new(false);
    let xcvr = LoopbackTransceiver::new();
    let io = GearIo {
        params: Box::new(params),
        output: Box::new(SimOutput::new()),
        scheduler: Box::new(ManualScheduler::new()),
        bus: Box::new(bus.clone()),
        memory: Box::new(SimMemoryBanks::new(0)),
        transceiver: Box::new(xcvr.clone()),
        timers: config.timers.clone(),
    };
    let mut engine = GearEngine::new(config, io);
    engine.enable();
    assert_eq!(xcvr.listening(), None);
    assert!(engine.state().flags.test_bus_power_on);
    engine.periodic_bus_check();
    bus.set(true);
    engine.periodic_bus_check();
    assert_eq!(xcvr.listening(), None);
    engine.periodic_bus_check();
    assert_eq!(xcvr.listening(), Some(2));
    assert!(!engine.state().flags.test_bus_power_on);
}

#[test]
fn disabled_gear_is_dark_and_deaf() {
    let mut b = Bench::short5();
    b.engine.disable();
    assert_eq!(b.actual(), 0);
    assert_eq!(b.xcvr.listening(), None);
    assert_eq!(b.frame(S5, cmd::QUERY_CONTROL_GEAR_PRESENT), None);
    assert_eq!(b.engine.state().msg_state, MsgState::Off);
    b.engine.enable();
    assert_eq!(b.frame(S5, cmd::QUERY_CONTROL_GEAR_PRESENT), Some(cmd::YES));
}

#[test]
fn bad_frames_keep_listening() {
    let mut b = Bench::short5();
    let before = b.xcvr.receive_count();
    b.engine
        .process_event(GearEvent::Codec(CodecEvent::RecvError));
    b.engine
        .process_event(GearEvent::Codec(CodecEvent::RecvDone(vec![S5])));
    assert_eq!(b.xcvr.receive_count(), before + 2);
    assert_eq!(b.engine.state().msg_state, MsgState::Idle);
}

#[test]
fn response_waits_for_xmit_done() {
    let mut b = Bench::short5();
    b.engine.process_event(GearEvent::Codec(CodecEvent::RecvDone(vec![
        S5,
        cmd::QUERY_VERSION_NUMBER,
    ])));
    assert_eq!(b.engine.state().msg_state, MsgState::WaitXmitDone);
    assert!(b.clock.advance(Duration::from_millis(1)).is_empty());
    assert!(b.xcvr.take_transmitted().is_empty());
    let expired = b.clock.advance(Duration::from_millis(2));
    let timeout = match expired.as_slice() {
        [ev @ GearEvent::Timeout(TimerId::ResponseDelay, _)] => ev.clone(),
        e => panic!("Expected the response delay, got {:?}", e),
    };
    b.engine.process_event(timeout);
    assert_eq!(b.xcvr.take_transmitted(), vec![vec![1]]);
    assert_eq!(b.engine.state().msg_state, MsgState::WaitXmitDone);
    b.engine.process_event(GearEvent::Codec(CodecEvent::XmitDone));
    assert_eq!(b.engine.state().msg_state, MsgState::Idle);
    assert_eq!(b.xcvr.listening(), Some(2));
}

#[test]
fn physical_selection() {
    let mut b = Bench::new(low_min_config(), |_| {});
    b.twice(cmd::INITIALISE, 0x00);
    // Random address no longer matches
    b.frame(cmd::SEARCHADDRH, 0x00);
    b.frame(cmd::PHYSICAL_SELECTION, 0);
    assert_eq!(
        b.engine.state().physical_selection,
        PhysicalSelection::Requested
    );
    assert!(!b.engine.state().flags.compare_mode_enabled);
    assert_eq!(b.frame(cmd::QUERY_SHORT_ADDRESS, 0), None);

    // Lamp removed
    b.output.set_lamp_ok(false);
    b.frame(BROADCAST, cmd::RECALL_MAX_LEVEL);
    b.ticks(1);
    b.frame(BROADCAST, cmd::QUERY_LAMP_FAILURE);
    assert_eq!(
        b.engine.state().physical_selection,
        PhysicalSelection::Enabled
    );
    assert_eq!(b.frame(BROADCAST, cmd::QUERY_ACTUAL_LEVEL), Some(0xff));
    assert_eq!(b.frame(cmd::QUERY_SHORT_ADDRESS, 0), Some(0xff));
    b.frame(cmd::PROGRAM_SHORT_ADDRESS, 0x21);
    assert_eq!(b.frame(cmd::QUERY_SHORT_ADDRESS, 0), Some(0x21));
    assert_eq!(b.frame(cmd::VERIFY_SHORT_ADDRESS, 0x21), Some(cmd::YES));

    b.frame(cmd::TERMINATE, 0);
    assert_eq!(
        b.engine.state().physical_selection,
        PhysicalSelection::Disabled
    );
    assert_eq!(b.frame(cmd::QUERY_SHORT_ADDRESS, 0), None);
}

#[test]
fn verify_short_address() {
    let mut b = Bench::new(low_min_config(), |_| {});
    b.twice(cmd::INITIALISE, 0x00);
    // Unassigned gear, random address equals the search address
    assert_eq!(b.frame(cmd::VERIFY_SHORT_ADDRESS, 0xff), Some(cmd::YES));
    assert_eq!(b.frame(cmd::VERIFY_SHORT_ADDRESS, 0x0b), None);
    b.frame(cmd::PROGRAM_SHORT_ADDRESS, 0x0b);
    assert_eq!(b.frame(cmd::VERIFY_SHORT_ADDRESS, 0x0b), Some(cmd::YES));
    assert_eq!(b.frame(cmd::VERIFY_SHORT_ADDRESS, 0xff), None);
    assert_eq!(b.frame(cmd::VERIFY_SHORT_ADDRESS, 0x0a), None);
}

#[test]
fn commissioning_window_survives_reset() {
    let mut b = Bench::new(low_min_config(), |_| {});
    b.twice(cmd::INITIALISE, 0x00);
    b.twice(BROADCAST, cmd::RESET);
    assert!(b.engine.state().flags.fifteen_min_timer_running);
    assert!(b.clock.is_running(TimerId::Commissioning));
    b.frame(cmd::SEARCHADDRH, 0x12);
    assert_eq!(b.engine.state().search_address, 0x12ffff);

    b.advance(Duration::from_secs(15 * 60));
    assert!(!b.engine.state().flags.fifteen_min_timer_running);
    b.frame(cmd::SEARCHADDRM, 0x34);
    assert_eq!(b.engine.state().search_address, 0x12ffff);

    // Disabling ends the window
    b.twice(cmd::INITIALISE, 0x00);
    b.engine.disable();
    assert!(!b.engine.state().flags.fifteen_min_timer_running);
    assert!(!b.engine.state().flags.compare_mode_enabled);
    assert!(!b.clock.is_running(TimerId::Commissioning));
}

#[test]
fn commissioning_window_closes() {
    let mut b = Bench::new(low_min_config(), |_| {});
    // Only in the commissioning window
    b.frame(cmd::SEARCHADDRH, 0x12);
    assert_eq!(b.engine.state().search_address, 0xffffff);

    b.twice(cmd::INITIALISE, 0xff);
    assert!(b.engine.state().flags.fifteen_min_timer_running);
    b.frame(cmd::SEARCHADDRH, 0x12);
    assert_eq!(b.engine.state().search_address, 0x12ffff);
    b.advance(Duration::from_secs(15 * 60));
    assert!(!b.engine.state().flags.fifteen_min_timer_running);
    b.frame(cmd::SEARCHADDRM, 0x34);
    assert_eq!(b.engine.state().search_address, 0x12ffff);

    // Not addressed by INITIALISE
    let mut b = Bench::short5();
    b.twice(cmd::INITIALISE, 0xff);
    assert!(!b.engine.state().flags.fifteen_min_timer_running);
    b.twice(cmd::INITIALISE, 0x0d);
    assert!(!b.engine.state().flags.fifteen_min_timer_running);
    b.twice(cmd::INITIALISE, S5);
    assert!(b.engine.state().flags.fifteen_min_timer_running);
}

fn broadcast(gears: &mut [Bench], addr: u8, data: u8) -> Vec<Option<u8>> {
    gears.iter_mut().map(|g| g.frame(addr, data)).collect()
}

fn broadcast_twice(gears: &mut [Bench], addr: u8, data: u8) {
    broadcast(gears, addr, data);
    broadcast(gears, addr, data);
}

fn set_search_addr(gears: &mut [Bench], addr: u32) {
    broadcast(gears, cmd::SEARCHADDRH, (addr >> 16) as u8);
    broadcast(gears, cmd::SEARCHADDRM, (addr >> 8) as u8);
    broadcast(gears, cmd::SEARCHADDRL, addr as u8);
}

fn compare(gears: &mut [Bench]) -> usize {
    broadcast(gears, cmd::COMPARE, 0)
        .into_iter()
        .filter(|a| *a == Some(cmd::YES))
        .count()
}

#[test]
fn arbitration_addresses_every_gear() {
    const N: usize = 8;
    let mut gears: Vec<Bench> = (0..N)
        .map(|i| {
            let config = GearConfig {
                serial_number: 1000 + 77 * i as u32,
                ..low_min_config()
            };
            Bench::new(config, |_| {})
        })
        .collect();

    broadcast_twice(&mut gears, cmd::INITIALISE, 0x00);
    broadcast_twice(&mut gears, cmd::RANDOMISE, 0x00);
    let mut randoms: Vec<u32> = gears
        .iter()
        .map(|g| g.engine.state().params.random_address)
        .collect();
    randoms.sort();
    randoms.dedup();
    assert_eq!(randoms.len(), N, "random addresses collide");

    let mut found = 0;
    loop {
        set_search_addr(&mut gears, 0xffffff);
        if compare(&mut gears) == 0 {
            break;
        }
        let mut low = 0u32;
        let mut high = 0xffffffu32;
        while low < high {
            let mid = (low + high) / 2;
            set_search_addr(&mut gears, mid);
            if compare(&mut gears) > 0 {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        set_search_addr(&mut gears, low);
        assert_eq!(compare(&mut gears), 1);
        assert_eq!(low, randoms[found]);

        let short = found as u8;
        broadcast(&mut gears, cmd::PROGRAM_SHORT_ADDRESS, (short << 1) | 1);
        let verified = broadcast(&mut gears, cmd::VERIFY_SHORT_ADDRESS, (short << 1) | 1);
        assert_eq!(verified.iter().filter(|a| a.is_some()).count(), 1);
        broadcast(&mut gears, cmd::WITHDRAW, 0);
        found += 1;
        assert!(found <= N);
    }
    broadcast(&mut gears, cmd::TERMINATE, 0);
    assert_eq!(found, N);

    for short in 0..N as u8 {
        let answers = broadcast(&mut gears, (short << 1) | 1, cmd::QUERY_CONTROL_GEAR_PRESENT);
        assert_eq!(answers.iter().filter(|a| a.is_some()).count(), 1);
    }
    for g in &gears {
        assert!(!g.engine.state().status.missing_short_address);
    }
}

#[tokio::test]
async fn runtime_answers_queries() {
    tokio::time::pause();
    let config = low_min_config();
    let hw = SimHardware::new(&config);
    hw.params.preset(ParamId::ShortAddress, 5);
    hw.params.preset(ParamId::MinLevel, 1);
    let params = hw.params.clone();
    let mut gear = GearRuntime::start(config, hw);
    let mut answers = match gear.backward_stream() {
        Some(stream) => stream,
        None => panic!("No backward stream"),
    };

    gear.send([S5, cmd::QUERY_MAX_LEVEL]).await.unwrap();
    assert_eq!(answers.next().await, Some(254));

    gear.send([S5_LEVEL, 128]).await.unwrap();
    gear.send([S5, cmd::QUERY_ACTUAL_LEVEL]).await.unwrap();
    assert_eq!(answers.next().await, Some(128));

    // Needs the repeat within 100 ms
    gear.send([cmd::DTR, 3]).await.unwrap();
    gear.send([S5, cmd::STORE_DTR_AS_FADE_TIME]).await.unwrap();
    gear.send([S5, cmd::STORE_DTR_AS_FADE_TIME]).await.unwrap();
    gear.send([S5, cmd::QUERY_FADE]).await.unwrap();
    assert_eq!(answers.next().await, Some(0x37));
    assert_eq!(params.value(ParamId::FadeTime), Some(3));

    let state = gear.shutdown().await.unwrap();
    assert_eq!(state.actual_level, 128);
    assert_eq!(state.params.short_address, 5);
}
