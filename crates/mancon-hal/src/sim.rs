//! In-process simulated bus for CI/CD testing without physical hardware.
//!
//! [`SimTransport`] hands out connections to [`SimModule`]s that keep a
//! plausible register model (motor power, encoders, digital and analog
//! inputs, an I2C scratch memory, LED colour) and count every fail-safe and
//! idle-pattern restore so tests can assert on cleanup behaviour.
//!
//! Faults are injected per module: latency, a sticky NACK code, or a module
//! that never becomes operable.  Every simulated bus call honours the
//! calling thread's [`interrupt`] flag, and address or status changes are
//! reported to the transport's [`ModuleEventSink`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use mancon_hal::sim::SimTransport;
//! use mancon_hal::{BusTransport, ModuleHandle};
//! use mancon_types::ModuleDescriptor;
//! use mancon_types::bus::{BusCommand, BusResponse};
//!
//! let transport = SimTransport::new();
//! let descriptor = ModuleDescriptor::new("DQ1", 2);
//! transport.add_module(&descriptor).set_encoder(0, 1200);
//!
//! let handle = ModuleHandle::new(transport.open(&descriptor).unwrap());
//! let reply = handle
//!     .send(&BusCommand::GetMotorEncoder { motor: 0 }, Duration::from_millis(50))
//!     .unwrap();
//! assert_eq!(reply, BusResponse::Value(1200));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use mancon_kernel::interrupt;
use mancon_types::ModuleDescriptor;
use mancon_types::bus::{BulkInputData, BusCommand, BusResponse, FaultCode, Orientation};
use parking_lot::Mutex;

use crate::transport::{
    BusFault, BusTransport, Imu, ModuleConnection, ModuleEvent, ModuleEventSink, ModuleId,
};

const MOTORS: usize = 4;
const SERVOS: usize = 6;

type SinkSlot = Mutex<Option<Weak<dyn ModuleEventSink>>>;

// ────────────────────────────────────────────────────────────────────────────
// Simulated module
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Registers {
    descriptor: Option<ModuleDescriptor>,
    operable: bool,
    latency: Duration,
    nack: Option<FaultCode>,
    open_connections: usize,
    fail_safe_count: usize,
    idle_pattern_restores: usize,
    sent: Vec<BusCommand>,
    motor_enabled: [bool; MOTORS],
    motor_power: [f64; MOTORS],
    encoders: [i32; MOTORS],
    servo_enabled: [bool; SERVOS],
    servo_pulse_us: [u16; SERVOS],
    digital_outputs: u8,
    digital_inputs: u8,
    analog_mv: [i16; 4],
    i2c: HashMap<(u8, u8), Vec<u8>>,
    led: (u8, u8, u8),
}

/// A simulated hardware module shared by every connection opened to it.
pub struct SimModule {
    id: ModuleId,
    regs: Mutex<Registers>,
    sink: Arc<SinkSlot>,
}

impl SimModule {
    fn new(id: ModuleId, descriptor: &ModuleDescriptor, sink: Arc<SinkSlot>) -> Self {
        Self {
            id,
            regs: Mutex::new(Registers {
                descriptor: Some(descriptor.clone()),
                operable: true,
                ..Registers::default()
            }),
            sink,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn descriptor(&self) -> Option<ModuleDescriptor> {
        self.regs.lock().descriptor.clone()
    }

    /// An inoperable module accepts connections but never answers a ping.
    pub fn set_operable(&self, operable: bool) {
        self.regs.lock().operable = operable;
    }

    /// Delay applied to every bus call.
    pub fn set_latency(&self, latency: Duration) {
        self.regs.lock().latency = latency;
    }

    /// NACK every subsequent command with `code` until cleared with `None`.
    pub fn set_nack(&self, code: Option<FaultCode>) {
        self.regs.lock().nack = code;
    }

    /// Move the module to a new address on the same bus.
    pub fn change_address(&self, new_address: u8) {
        if let Some(d) = self.regs.lock().descriptor.as_mut() {
            d.module_address = new_address;
        }
        self.emit(ModuleEvent::AddressChanged { new_address });
    }

    /// Simulate a module reset: outputs drop to their power-on state.
    pub fn reset(&self) {
        {
            let mut regs = self.regs.lock();
            regs.motor_power = [0.0; MOTORS];
            regs.motor_enabled = [false; MOTORS];
            regs.servo_enabled = [false; SERVOS];
            regs.digital_outputs = 0;
        }
        self.emit(ModuleEvent::StatusChanged);
    }

    pub fn set_encoder(&self, motor: usize, ticks: i32) {
        if let Some(e) = self.regs.lock().encoders.get_mut(motor) {
            *e = ticks;
        }
    }

    pub fn set_digital_inputs(&self, bits: u8) {
        self.regs.lock().digital_inputs = bits;
    }

    pub fn set_analog(&self, channel: usize, millivolts: i16) {
        if let Some(a) = self.regs.lock().analog_mv.get_mut(channel) {
            *a = millivolts;
        }
    }

    pub fn open_connections(&self) -> usize {
        self.regs.lock().open_connections
    }

    pub fn fail_safe_count(&self) -> usize {
        self.regs.lock().fail_safe_count
    }

    pub fn idle_pattern_restores(&self) -> usize {
        self.regs.lock().idle_pattern_restores
    }

    pub fn motor_power(&self, motor: usize) -> f64 {
        self.regs.lock().motor_power.get(motor).copied().unwrap_or_default()
    }

    pub fn led(&self) -> (u8, u8, u8) {
        self.regs.lock().led
    }

    /// Every command received so far, oldest first.
    pub fn sent_commands(&self) -> Vec<BusCommand> {
        self.regs.lock().sent.clone()
    }

    fn emit(&self, event: ModuleEvent) {
        let sink = self.sink.lock().as_ref().and_then(Weak::upgrade);
        if let Some(sink) = sink {
            sink.on_module_event(self.id, event);
        }
    }

    /// Wait out the configured latency, bounded by `timeout`.
    fn respond(&self, timeout: Duration) -> Result<(), BusFault> {
        if interrupt::is_interrupted() {
            return Err(BusFault::Interrupted);
        }
        let latency = self.regs.lock().latency;
        if latency > timeout {
            thread::sleep(timeout);
            return Err(BusFault::Timeout);
        }
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        if interrupt::is_interrupted() {
            return Err(BusFault::Interrupted);
        }
        Ok(())
    }

    fn execute(&self, command: &BusCommand) -> Result<BusResponse, BusFault> {
        let mut regs = self.regs.lock();
        regs.sent.push(command.clone());
        if let Some(code) = regs.nack {
            return Err(BusFault::Nack(code));
        }

        let out_of_range = BusFault::Nack(FaultCode::PARAM_OUT_OF_RANGE);
        let response = match command {
            BusCommand::SetMotorEnable { motor, enabled } => {
                *regs.motor_enabled.get_mut(usize::from(*motor)).ok_or(out_of_range)? = *enabled;
                BusResponse::Ack
            }
            BusCommand::SetMotorPower { motor, power } => {
                *regs.motor_power.get_mut(usize::from(*motor)).ok_or(out_of_range)? = *power;
                BusResponse::Ack
            }
            BusCommand::ResetMotorEncoder { motor } => {
                *regs.encoders.get_mut(usize::from(*motor)).ok_or(out_of_range)? = 0;
                BusResponse::Ack
            }
            BusCommand::GetMotorEncoder { motor } => {
                BusResponse::Value(*regs.encoders.get(usize::from(*motor)).ok_or(out_of_range)?)
            }
            BusCommand::GetMotorCurrent { motor } => {
                let power = *regs.motor_power.get(usize::from(*motor)).ok_or(out_of_range)?;
                BusResponse::Value((power.abs() * 1000.0) as i32)
            }
            BusCommand::SetServoPulseWidth { servo, pulse_width_us } => {
                let slot = regs.servo_pulse_us.get_mut(usize::from(*servo));
                *slot.ok_or(out_of_range)? = *pulse_width_us;
                BusResponse::Ack
            }
            BusCommand::SetServoEnable { servo, enabled } => {
                *regs.servo_enabled.get_mut(usize::from(*servo)).ok_or(out_of_range)? = *enabled;
                BusResponse::Ack
            }
            BusCommand::SetDigitalOutput { pin, high } => {
                let mask = 1u8.checked_shl(u32::from(*pin)).ok_or(out_of_range)?;
                if *high {
                    regs.digital_outputs |= mask;
                } else {
                    regs.digital_outputs &= !mask;
                }
                BusResponse::Ack
            }
            BusCommand::GetDigitalInput { pin } => {
                let bits = regs.digital_inputs | regs.digital_outputs;
                let level = bits.checked_shr(u32::from(*pin)).ok_or(out_of_range)? & 1;
                BusResponse::Value(i32::from(level))
            }
            BusCommand::GetAnalogInput { channel } => {
                let millivolts = regs.analog_mv.get(usize::from(*channel));
                BusResponse::Value(i32::from(*millivolts.ok_or(out_of_range)?))
            }
            BusCommand::I2cWrite { bus, address, data } => {
                regs.i2c.insert((*bus, *address), data.clone());
                BusResponse::Ack
            }
            BusCommand::I2cRead { bus, address, length, .. } => {
                let mut data = regs.i2c.get(&(*bus, *address)).cloned().unwrap_or_default();
                data.resize(usize::from(*length), 0);
                BusResponse::Bytes(data)
            }
            BusCommand::SetLedColor { red, green, blue } => {
                regs.led = (*red, *green, *blue);
                BusResponse::Ack
            }
            BusCommand::GetBulkInputData => BusResponse::BulkInput(BulkInputData {
                digital_inputs: regs.digital_inputs,
                encoder_positions: regs.encoders,
                encoder_velocities: [0; MOTORS],
                motor_at_target: 0,
                analog_millivolts: regs.analog_mv,
            }),
            _ => BusResponse::Ack,
        };
        Ok(response)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connection
// ────────────────────────────────────────────────────────────────────────────

struct SimConnection {
    module: Arc<SimModule>,
    closed: AtomicBool,
}

impl ModuleConnection for SimConnection {
    fn module_id(&self) -> ModuleId {
        self.module.id
    }

    fn descriptor(&self) -> ModuleDescriptor {
        self.module.descriptor().unwrap_or_else(|| ModuleDescriptor::new("sim", 0))
    }

    fn ping(&self, timeout: Duration) -> Result<(), BusFault> {
        if !self.module.regs.lock().operable {
            return Err(BusFault::Timeout);
        }
        self.module.respond(timeout)
    }

    fn send(&self, command: &BusCommand, timeout: Duration) -> Result<BusResponse, BusFault> {
        self.module.respond(timeout)?;
        self.module.execute(command)
    }

    fn fail_safe(&self, timeout: Duration) -> Result<(), BusFault> {
        self.module.respond(timeout)?;
        let mut regs = self.module.regs.lock();
        regs.motor_power = [0.0; MOTORS];
        regs.motor_enabled = [false; MOTORS];
        regs.servo_enabled = [false; SERVOS];
        regs.digital_outputs = 0;
        regs.fail_safe_count += 1;
        Ok(())
    }

    fn restore_idle_pattern(&self, timeout: Duration) -> Result<(), BusFault> {
        self.module.respond(timeout)?;
        let mut regs = self.module.regs.lock();
        regs.led = (0, 255, 0);
        regs.idle_pattern_restores += 1;
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let mut regs = self.module.regs.lock();
            regs.open_connections = regs.open_connections.saturating_sub(1);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// IMU
// ────────────────────────────────────────────────────────────────────────────

/// Simulated embedded IMU reporting a settable orientation.
#[derive(Default)]
pub struct SimImu {
    initialized: AtomicBool,
    orientation: Mutex<Orientation>,
}

impl SimImu {
    pub fn set_orientation(&self, orientation: Orientation) {
        *self.orientation.lock() = orientation;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

struct SimImuLink(Arc<SimImu>);

impl Imu for SimImuLink {
    fn initialize(&self, _timeout: Duration) -> Result<(), BusFault> {
        if interrupt::is_interrupted() {
            return Err(BusFault::Interrupted);
        }
        self.0.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn orientation(&self, _timeout: Duration) -> Result<Orientation, BusFault> {
        if !self.0.is_initialized() {
            return Err(BusFault::Nack(FaultCode::I2C_NO_RESULTS_PENDING));
        }
        Ok(*self.0.orientation.lock())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transport
// ────────────────────────────────────────────────────────────────────────────

/// A bus whose modules exist only in memory.
///
/// Opening an unknown descriptor creates the module on the fly, so tests
/// only need [`add_module`][Self::add_module] when they want to configure it
/// first.
#[derive(Default)]
pub struct SimTransport {
    modules: Mutex<Vec<Arc<SimModule>>>,
    next_id: AtomicU64,
    imu: Arc<SimImu>,
    sink: Arc<SinkSlot>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the module at `descriptor`.
    pub fn add_module(&self, descriptor: &ModuleDescriptor) -> Arc<SimModule> {
        let mut modules = self.modules.lock();
        let existing = modules
            .iter()
            .find(|m| m.descriptor().as_ref() == Some(descriptor));
        if let Some(existing) = existing {
            return existing.clone();
        }
        let id = ModuleId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let module = Arc::new(SimModule::new(id, descriptor, self.sink.clone()));
        modules.push(module.clone());
        module
    }

    /// The module currently answering at `descriptor`.
    pub fn module(&self, descriptor: &ModuleDescriptor) -> Option<Arc<SimModule>> {
        self.modules
            .lock()
            .iter()
            .find(|m| m.descriptor().as_ref() == Some(descriptor))
            .cloned()
    }

    pub fn sim_imu(&self) -> Arc<SimImu> {
        self.imu.clone()
    }
}

impl BusTransport for SimTransport {
    fn open(&self, descriptor: &ModuleDescriptor) -> Result<Box<dyn ModuleConnection>, BusFault> {
        if interrupt::is_interrupted() {
            return Err(BusFault::Interrupted);
        }
        let module = self.add_module(descriptor);
        module.regs.lock().open_connections += 1;
        Ok(Box::new(SimConnection {
            module,
            closed: AtomicBool::new(false),
        }))
    }

    fn imu(&self) -> Result<Box<dyn Imu>, BusFault> {
        Ok(Box::new(SimImuLink(self.imu.clone())))
    }

    fn set_event_sink(&self, sink: Weak<dyn ModuleEventSink>) {
        *self.sink.lock() = Some(sink);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mancon_kernel::InterruptFlag;

    const T: Duration = Duration::from_millis(50);

    #[test]
    fn same_descriptor_maps_to_same_module() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 2);
        let a = transport.open(&d).unwrap();
        let b = transport.open(&d).unwrap();
        assert_eq!(a.module_id(), b.module_id());
        assert_eq!(transport.module(&d).unwrap().open_connections(), 2);
    }

    #[test]
    fn motor_power_is_recorded_and_cleared_by_fail_safe() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 2);
        let conn = transport.open(&d).unwrap();
        conn.send(&BusCommand::SetMotorPower { motor: 1, power: 0.5 }, T).unwrap();

        let module = transport.module(&d).unwrap();
        assert!((module.motor_power(1) - 0.5).abs() < f64::EPSILON);

        conn.fail_safe(T).unwrap();
        assert!((module.motor_power(1)).abs() < f64::EPSILON);
        assert_eq!(module.fail_safe_count(), 1);
    }

    #[test]
    fn injected_nack_is_returned() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 2);
        transport.add_module(&d).set_nack(Some(FaultCode::I2C_MASTER_BUSY));
        let conn = transport.open(&d).unwrap();
        let result = conn.send(&BusCommand::GetBulkInputData, T);
        assert_eq!(result, Err(BusFault::Nack(FaultCode::I2C_MASTER_BUSY)));
    }

    #[test]
    fn latency_beyond_timeout_is_a_timeout() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 2);
        transport.add_module(&d).set_latency(Duration::from_millis(40));
        let conn = transport.open(&d).unwrap();
        let result = conn.send(&BusCommand::GetBulkInputData, Duration::from_millis(5));
        assert_eq!(result, Err(BusFault::Timeout));
    }

    #[test]
    fn raised_interrupt_aborts_bus_calls() {
        let transport = SimTransport::new();
        let conn = transport.open(&ModuleDescriptor::new("DQ1", 2)).unwrap();

        let flag = InterruptFlag::new();
        let _installed = flag.install();
        flag.raise();
        assert_eq!(conn.send(&BusCommand::GetBulkInputData, T), Err(BusFault::Interrupted));
    }

    #[test]
    fn i2c_read_returns_last_write() {
        let transport = SimTransport::new();
        let conn = transport.open(&ModuleDescriptor::new("DQ1", 2)).unwrap();
        conn.send(
            &BusCommand::I2cWrite {
                bus: 0,
                address: 0x28,
                data: vec![1, 2, 3],
            },
            T,
        )
        .unwrap();
        let read = conn
            .send(
                &BusCommand::I2cRead {
                    bus: 0,
                    address: 0x28,
                    register: None,
                    length: 2,
                },
                T,
            )
            .unwrap();
        assert_eq!(read, BusResponse::Bytes(vec![1, 2]));
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(ModuleId, ModuleEvent)>>);

    impl ModuleEventSink for Recorder {
        fn on_module_event(&self, module: ModuleId, event: ModuleEvent) {
            self.0.lock().push((module, event));
        }
    }

    #[test]
    fn address_change_is_visible_through_connections() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 2);
        let conn = transport.open(&d).unwrap();
        transport.module(&d).unwrap().change_address(7);
        assert_eq!(conn.descriptor(), ModuleDescriptor::new("DQ1", 7));
    }

    #[test]
    fn module_events_reach_the_sink_while_it_lives() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 2);
        let module = transport.add_module(&d);
        module.change_address(9);

        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn ModuleEventSink> = recorder.clone();
        transport.set_event_sink(Arc::downgrade(&sink));
        module.change_address(3);
        module.reset();
        assert_eq!(
            *recorder.0.lock(),
            vec![
                (module.id(), ModuleEvent::AddressChanged { new_address: 3 }),
                (module.id(), ModuleEvent::StatusChanged),
            ]
        );

        drop(sink);
        drop(recorder);
        module.reset();
    }

    #[test]
    fn reset_drops_outputs() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 2);
        let conn = transport.open(&d).unwrap();
        conn.send(&BusCommand::SetMotorPower { motor: 0, power: 0.8 }, T).unwrap();
        conn.send(&BusCommand::SetDigitalOutput { pin: 1, high: true }, T).unwrap();

        let module = transport.module(&d).unwrap();
        module.reset();
        assert!(module.motor_power(0).abs() < f64::EPSILON);
        let level = conn.send(&BusCommand::GetDigitalInput { pin: 1 }, T).unwrap();
        assert_eq!(level, BusResponse::Value(0));
        assert_eq!(module.fail_safe_count(), 0, "a reset is not a fail-safe");
    }

    #[test]
    fn digital_inputs_read_back_per_pin() {
        let transport = SimTransport::new();
        let d = ModuleDescriptor::new("DQ1", 2);
        transport.add_module(&d).set_digital_inputs(0b0000_0100);
        let conn = transport.open(&d).unwrap();
        let high = conn.send(&BusCommand::GetDigitalInput { pin: 2 }, T).unwrap();
        let low = conn.send(&BusCommand::GetDigitalInput { pin: 0 }, T).unwrap();
        assert_eq!((high, low), (BusResponse::Value(1), BusResponse::Value(0)));
    }

    #[test]
    fn imu_requires_initialisation() {
        let transport = SimTransport::new();
        let imu = transport.imu().unwrap();
        assert!(imu.orientation(T).is_err());
        imu.initialize(T).unwrap();
        assert_eq!(imu.orientation(T).unwrap(), Orientation::default());

        let tilted = Orientation {
            yaw: 1.5,
            ..Orientation::default()
        };
        transport.sim_imu().set_orientation(tilted);
        assert!(transport.sim_imu().is_initialized());
        assert_eq!(imu.orientation(T).unwrap(), tilted);
    }
}
