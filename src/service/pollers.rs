//! Background device and till pollers.
//!
//! Every poller is an endless loop with its own period that remembers the last
//! value it observed and pushes an event only when a new observation differs.
//! An inconclusive observation (the device lock was busy) keeps the previous
//! value.
//!
//! | Poller    | Period | Events                                       |
//! |-----------|--------|----------------------------------------------|
//! | drawer    | 1 s    | `DRAWER_ALERT_*`, `DEVICE_STATUS_CHANGED`    |
//! | SAT       | 300 s  | `DEVICE_STATUS_CHANGED`                      |
//! | pinpad    | 60 s   | `DEVICE_STATUS_CHANGED`                      |
//! | till      | daily  | `CHECK_TILL_FINISHED`                        |
//! | telemetry | 3600 s | none                                         |

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use tokio::task::JoinHandle;

use super::ports::{TelemetrySink, TillLedger};
use crate::device::{PrinterSupervisor, StatusCheck};
use crate::domain::{AcquireMode, Device, DeviceCoordinator, LastTill, PosEvent, StationId};
use crate::error::HubError;

/// Shortest wait before the daily till check.
pub const MIN_TILL_CHECK_DELAY: Duration = Duration::from_secs(60);

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Last observed value of a polled state.
///
/// Starts out unknown, so the first observation is always a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeTrigger<T> {
    last: Option<T>,
}

impl<T> Default for EdgeTrigger<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T: PartialEq> EdgeTrigger<T> {
    /// Creates a trigger with no observation.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Records `value`; returns `true` if it differs from the previous one.
    pub fn observe(&mut self, value: T) -> bool {
        if self.last.as_ref() == Some(&value) {
            return false;
        }
        self.last = Some(value);
        true
    }

    /// Returns the last observed value.
    #[must_use]
    pub const fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Drawer
// ---------------------------------------------------------------------------

/// Outcome of one drawer read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawerReading {
    /// The drawer is open.
    Open,
    /// The drawer is closed.
    Closed,
    /// The printer could not be read or none is configured.
    Unavailable,
}

impl DrawerReading {
    /// Maps the printer check result to a reading.
    #[must_use]
    pub const fn from_check(drawer_open: Option<bool>) -> Self {
        match drawer_open {
            Some(true) => Self::Open,
            Some(false) => Self::Closed,
            None => Self::Unavailable,
        }
    }

    /// Drawer alert announcing this reading.
    #[must_use]
    pub fn alert(self) -> PosEvent {
        match self {
            Self::Open => PosEvent::DrawerAlertOpen,
            Self::Closed => PosEvent::DrawerAlertClose,
            Self::Unavailable => PosEvent::DrawerAlertError,
        }
    }

    /// Printer status derived from the reading: `null` when unreadable.
    #[must_use]
    pub const fn printer_status(self) -> Option<bool> {
        match self {
            Self::Unavailable => None,
            Self::Open | Self::Closed => Some(true),
        }
    }
}

/// Reads the drawer under the printer lock with a single reconnection try.
pub async fn check_drawer(
    coordinator: &DeviceCoordinator,
    supervisor: &PrinterSupervisor,
    station: &StationId,
) -> DrawerReading {
    let result = match coordinator
        .locks()
        .acquire(Device::Printer, AcquireMode::Blocking)
        .await
    {
        Ok(guard) => supervisor.ensure_printer(&guard, station, 1).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(drawer_open) => DrawerReading::from_check(drawer_open),
        Err(err) => {
            tracing::debug!(%station, error = %err, "drawer check failed");
            DrawerReading::Unavailable
        }
    }
}

/// Drawer poller state.
#[derive(Debug)]
pub struct DrawerWatch {
    coordinator: Arc<DeviceCoordinator>,
    supervisor: Arc<PrinterSupervisor>,
    station: StationId,
    drawer: EdgeTrigger<DrawerReading>,
    printer: EdgeTrigger<Option<bool>>,
}

impl DrawerWatch {
    /// Creates a watch for `station`'s drawer.
    #[must_use]
    pub fn new(
        coordinator: Arc<DeviceCoordinator>,
        supervisor: Arc<PrinterSupervisor>,
        station: StationId,
    ) -> Self {
        Self {
            coordinator,
            supervisor,
            station,
            drawer: EdgeTrigger::new(),
            printer: EdgeTrigger::new(),
        }
    }

    /// Records a reading and returns the events it causes.
    pub fn record(&mut self, reading: DrawerReading) -> Vec<PosEvent> {
        let mut events = Vec::new();
        if self.drawer.observe(reading) {
            events.push(reading.alert());
        }
        let status = reading.printer_status();
        if self.printer.observe(status) {
            events.push(PosEvent::DeviceStatusChanged {
                device: Device::Printer,
                status,
            });
        }
        events
    }

    /// Reads the drawer once and publishes any change.
    pub async fn poll_once(&mut self) {
        let reading = check_drawer(&self.coordinator, &self.supervisor, &self.station).await;
        for event in self.record(reading) {
            tracing::info!(station = %self.station, event = event.event_type_str(), "drawer status changed");
            self.coordinator
                .events()
                .push_to_station(&self.station, &event)
                .await;
        }
    }

    /// Polls forever every `period`.
    pub async fn run(mut self, period: Duration) {
        loop {
            self.poll_once().await;
            tokio::time::sleep(period).await;
        }
    }
}

// ---------------------------------------------------------------------------
// SAT and pinpad
// ---------------------------------------------------------------------------

/// Runs `status` if `device` is free.
///
/// Returns `None` when the device is busy, which callers treat as "no new
/// information".
pub async fn check_device(
    coordinator: &DeviceCoordinator,
    device: Device,
    status: &dyn StatusCheck,
) -> Option<bool> {
    match coordinator.locks().acquire(device, AcquireMode::NonBlocking).await {
        Ok(_guard) => Some(status.check().await),
        Err(HubError::LockContention(_)) => None,
        Err(err) => {
            tracing::warn!(%device, error = %err, "device check skipped");
            None
        }
    }
}

/// Status poller for a device reached through a [`StatusCheck`].
#[derive(Debug)]
pub struct DeviceStatusWatch {
    coordinator: Arc<DeviceCoordinator>,
    device: Device,
    status_check: Arc<dyn StatusCheck>,
    station: StationId,
    status: EdgeTrigger<bool>,
}

impl DeviceStatusWatch {
    /// Creates a watch that reports `device` changes to `station`.
    #[must_use]
    pub fn new(
        coordinator: Arc<DeviceCoordinator>,
        device: Device,
        status_check: Arc<dyn StatusCheck>,
        station: StationId,
    ) -> Self {
        Self {
            coordinator,
            device,
            status_check,
            station,
            status: EdgeTrigger::new(),
        }
    }

    /// Records a check result (`None` = inconclusive) and returns the event
    /// it causes, if any.
    pub fn record(&mut self, observed: Option<bool>) -> Option<PosEvent> {
        let status = observed?;
        self.status
            .observe(status)
            .then_some(PosEvent::DeviceStatusChanged {
                device: self.device,
                status: Some(status),
            })
    }

    /// Checks once and publishes any change.
    pub async fn poll_once(&mut self) {
        let observed = check_device(&self.coordinator, self.device, self.status_check.as_ref()).await;
        if let Some(event) = self.record(observed) {
            tracing::info!(station = %self.station, device = %self.device, status = ?observed, "device status changed");
            self.coordinator
                .events()
                .push_to_station(&self.station, &event)
                .await;
        }
    }

    /// Polls forever every `period`.
    pub async fn run(mut self, period: Duration) {
        loop {
            self.poll_once().await;
            tokio::time::sleep(period).await;
        }
    }
}

/// Point-in-time status of the station's devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatusSnapshot {
    /// SAT working; `true` when absent or busy.
    pub sat: bool,
    /// Pinpad working; `true` when absent or busy.
    pub pinpad: bool,
    /// `None` when the printer is unreadable or not configured.
    pub printer: Option<bool>,
}

/// Reads every device once.
pub async fn device_status(
    coordinator: &DeviceCoordinator,
    supervisor: &PrinterSupervisor,
    station: &StationId,
    sat: Option<&dyn StatusCheck>,
    pinpad: Option<&dyn StatusCheck>,
) -> DeviceStatusSnapshot {
    let sat = match sat {
        Some(check) => check_device(coordinator, Device::Sat, check).await.unwrap_or(true),
        None => true,
    };
    let pinpad = match pinpad {
        Some(check) => check_device(coordinator, Device::Pinpad, check)
            .await
            .unwrap_or(true),
        None => true,
    };
    let printer = check_drawer(coordinator, supervisor, station)
        .await
        .printer_status();
    DeviceStatusSnapshot {
        sat,
        pinpad,
        printer,
    }
}

// ---------------------------------------------------------------------------
// Till deadline
// ---------------------------------------------------------------------------

/// Time from `now` until the next `hour`:00 plus `tolerance`, never less
/// than [`MIN_TILL_CHECK_DELAY`].
#[must_use]
pub fn next_till_check_delay(now: NaiveDateTime, hour: u32, tolerance: Duration) -> Duration {
    let target = now.date().and_hms_opt(hour, 0, 0).and_then(|today| {
        if today > now {
            Some(today)
        } else {
            today.checked_add_signed(TimeDelta::days(1))
        }
    });
    let wait = target
        .and_then(|target| (target - now).to_std().ok())
        .unwrap_or(ONE_DAY);
    wait.saturating_add(tolerance).max(MIN_TILL_CHECK_DELAY)
}

/// Daily announcement of the station's last till status.
#[derive(Debug)]
pub struct TillDeadlineWatch {
    coordinator: Arc<DeviceCoordinator>,
    tills: Arc<dyn TillLedger>,
    station: StationId,
    hour: u32,
    tolerance: Duration,
}

impl TillDeadlineWatch {
    /// Creates the watch.
    #[must_use]
    pub fn new(
        coordinator: Arc<DeviceCoordinator>,
        tills: Arc<dyn TillLedger>,
        station: StationId,
        hour: u32,
        tolerance: Duration,
    ) -> Self {
        Self {
            coordinator,
            tills,
            station,
            hour,
            tolerance,
        }
    }

    /// Publishes `CHECK_TILL_FINISHED` with the last till status.
    ///
    /// # Errors
    ///
    /// Returns the till ledger's error; nothing is published then.
    pub async fn announce(&self) -> Result<(), HubError> {
        let status = self.tills.last_till_status(&self.station).await?;
        let event = PosEvent::CheckTillFinished {
            last_till: LastTill { status },
        };
        self.coordinator
            .events()
            .push_to_station(&self.station, &event)
            .await;
        Ok(())
    }

    /// Sleeps until each new working day and announces.
    pub async fn run(self) {
        loop {
            let delay = next_till_check_delay(Local::now().naive_local(), self.hour, self.tolerance);
            tracing::debug!(station = %self.station, delay_secs = delay.as_secs(), "next till check scheduled");
            tokio::time::sleep(delay).await;
            if let Err(err) = self.announce().await {
                tracing::warn!(station = %self.station, error = %err, "till check failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Periodic telemetry report.
#[derive(Debug)]
pub struct TelemetryWatch {
    sink: Arc<dyn TelemetrySink>,
    station: StationId,
}

impl TelemetryWatch {
    /// Creates the watch.
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>, station: StationId) -> Self {
        Self { sink, station }
    }

    /// Reports now and then every `period`.
    pub async fn run(self, period: Duration) {
        loop {
            if let Err(err) = self.sink.report(&self.station).await {
                tracing::warn!(station = %self.station, error = %err, "telemetry report failed");
            }
            tokio::time::sleep(period).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Periods and schedule of the pollers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    /// Station the pollers report to.
    pub station: StationId,
    /// Drawer poll period.
    pub drawer_period: Duration,
    /// SAT poll period.
    pub sat_period: Duration,
    /// Pinpad poll period.
    pub pinpad_period: Duration,
    /// Telemetry report period.
    pub telemetry_period: Duration,
    /// Hour of day a new working day starts.
    pub till_check_hour: u32,
    /// Extra wait after that hour.
    pub till_check_tolerance: Duration,
    /// Developer mode skips telemetry.
    pub developer_mode: bool,
}

/// Collaborators the pollers need.
#[derive(Debug, Clone)]
pub struct PollerDeps {
    /// Locks and event stream.
    pub coordinator: Arc<DeviceCoordinator>,
    /// Printer check.
    pub supervisor: Arc<PrinterSupervisor>,
    /// Till status source.
    pub tills: Arc<dyn TillLedger>,
    /// SAT check; no SAT poller without one.
    pub sat: Option<Arc<dyn StatusCheck>>,
    /// Pinpad check; no pinpad poller without one.
    pub pinpad: Option<Arc<dyn StatusCheck>>,
    /// Telemetry destination.
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Spawns every poller that applies and returns their handles.
pub fn spawn_pollers(settings: &PollerSettings, deps: PollerDeps) -> Vec<JoinHandle<()>> {
    let station = &settings.station;
    let mut handles = Vec::new();

    let drawer = DrawerWatch::new(
        Arc::clone(&deps.coordinator),
        Arc::clone(&deps.supervisor),
        station.clone(),
    );
    handles.push(tokio::spawn(drawer.run(settings.drawer_period)));

    if let Some(check) = deps.sat {
        let sat = DeviceStatusWatch::new(Arc::clone(&deps.coordinator), Device::Sat, check, station.clone());
        handles.push(tokio::spawn(sat.run(settings.sat_period)));
    }

    if let Some(check) = deps.pinpad {
        let pinpad = DeviceStatusWatch::new(
            Arc::clone(&deps.coordinator),
            Device::Pinpad,
            check,
            station.clone(),
        );
        handles.push(tokio::spawn(pinpad.run(settings.pinpad_period)));
    }

    let till = TillDeadlineWatch::new(
        Arc::clone(&deps.coordinator),
        deps.tills,
        station.clone(),
        settings.till_check_hour,
        settings.till_check_tolerance,
    );
    handles.push(tokio::spawn(till.run()));

    if settings.developer_mode {
        tracing::info!("developer mode, telemetry disabled");
    } else {
        let telemetry = TelemetryWatch::new(deps.telemetry, station.clone());
        handles.push(tokio::spawn(telemetry.run(settings.telemetry_period)));
    }

    tracing::info!(%station, pollers = handles.len(), "pollers started");
    handles
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::device::DeviceManager;
    use crate::device::supervisor::tests::ScriptedDevices;
    use crate::domain::{Station, TillStatus};
    use crate::service::memory::InMemoryDomain;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FixedStatus {
        ok: AtomicBool,
        calls: AtomicUsize,
    }

    impl FixedStatus {
        fn new(ok: bool) -> Arc<Self> {
            Arc::new(Self {
                ok: AtomicBool::new(ok),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StatusCheck for FixedStatus {
        async fn check(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ok.load(Ordering::SeqCst)
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        let Some(time) = NaiveDate::from_ymd_opt(2024, 3, 10).and_then(|d| d.and_hms_opt(hour, minute, 0))
        else {
            panic!("valid date");
        };
        time
    }

    fn watch(devices: ScriptedDevices) -> DrawerWatch {
        DrawerWatch::new(
            Arc::new(DeviceCoordinator::new()),
            Arc::new(PrinterSupervisor::new(Arc::new(devices), Duration::ZERO)),
            StationId::from("s1"),
        )
    }

    fn is_drawer_alert(event: &PosEvent) -> bool {
        matches!(
            event,
            PosEvent::DrawerAlertOpen | PosEvent::DrawerAlertClose | PosEvent::DrawerAlertError
        )
    }

    #[test]
    fn edge_trigger_fires_on_changes_only() {
        let mut trigger = EdgeTrigger::new();
        assert!(trigger.observe(1));
        assert!(!trigger.observe(1));
        assert!(trigger.observe(2));
        assert_eq!(trigger.last(), Some(&2));
    }

    #[test]
    fn drawer_events_follow_changes_not_polls() {
        let mut watch = watch(ScriptedDevices::without_printer());
        let readings = [
            DrawerReading::from_check(Some(true)),
            DrawerReading::from_check(Some(true)),
            DrawerReading::from_check(Some(false)),
            DrawerReading::from_check(None),
            DrawerReading::from_check(None),
        ];

        let alerts: Vec<PosEvent> = readings
            .into_iter()
            .flat_map(|reading| watch.record(reading))
            .filter(is_drawer_alert)
            .collect();

        assert_eq!(
            alerts,
            vec![
                PosEvent::DrawerAlertOpen,
                PosEvent::DrawerAlertClose,
                PosEvent::DrawerAlertError,
            ]
        );
    }

    #[test]
    fn printer_status_announced_when_fault_flips() {
        let mut watch = watch(ScriptedDevices::without_printer());
        let statuses: Vec<Option<bool>> = [
            DrawerReading::Open,
            DrawerReading::Closed,
            DrawerReading::Unavailable,
            DrawerReading::Unavailable,
            DrawerReading::Open,
        ]
        .into_iter()
        .flat_map(|reading| watch.record(reading))
        .filter_map(|event| match event {
            PosEvent::DeviceStatusChanged {
                device: Device::Printer,
                status,
            } => Some(status),
            _ => None,
        })
        .collect();
        assert_eq!(statuses, vec![Some(true), None, Some(true)]);
    }

    #[tokio::test]
    async fn drawer_poll_publishes_to_station() {
        let mut watch = watch(ScriptedDevices::with_printer(vec![Ok(true)]));
        let mut source = watch.coordinator.events().subscribe(&StationId::from("s1"));

        watch.poll_once().await;
        watch.poll_once().await;

        let mut received = Vec::new();
        for _ in 0..3 {
            let Some(event) = source.next_event().await else {
                panic!("stream ended");
            };
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                json!({}),
                json!({"type": "DRAWER_ALERT_OPEN"}),
                json!({"type": "DEVICE_STATUS_CHANGED", "device": "printer", "status": true}),
            ]
        );
        assert!(!watch.coordinator.locks().lock_for(Device::Printer).is_locked());
    }

    #[tokio::test]
    async fn drawer_without_printer_is_unavailable() {
        let coordinator = DeviceCoordinator::new();
        let supervisor = PrinterSupervisor::new(
            Arc::new(ScriptedDevices::without_printer()) as Arc<dyn DeviceManager>,
            Duration::ZERO,
        );
        let reading = check_drawer(&coordinator, &supervisor, &StationId::from("s1")).await;
        assert_eq!(reading, DrawerReading::Unavailable);
    }

    #[tokio::test]
    async fn contended_check_keeps_previous_status() {
        let coordinator = Arc::new(DeviceCoordinator::new());
        let sat = FixedStatus::new(true);
        let mut watch = DeviceStatusWatch::new(
            Arc::clone(&coordinator),
            Device::Sat,
            Arc::clone(&sat) as Arc<dyn StatusCheck>,
            StationId::from("s1"),
        );

        let first = check_device(&coordinator, Device::Sat, sat.as_ref()).await;
        assert!(watch.record(first).is_some());

        let Ok(_held) = coordinator
            .locks()
            .acquire(Device::Sat, AcquireMode::NonBlocking)
            .await
        else {
            panic!("sat lock free");
        };
        sat.ok.store(false, Ordering::SeqCst);
        let busy = check_device(&coordinator, Device::Sat, sat.as_ref()).await;
        assert_eq!(busy, None);
        assert!(watch.record(busy).is_none());
        assert_eq!(sat.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn device_watch_reports_each_flip_once() {
        let mut watch = DeviceStatusWatch::new(
            Arc::new(DeviceCoordinator::new()),
            Device::Pinpad,
            FixedStatus::new(true),
            StationId::from("s1"),
        );
        let events: Vec<PosEvent> = [Some(true), Some(true), None, Some(false), Some(false)]
            .into_iter()
            .filter_map(|observed| watch.record(observed))
            .collect();
        assert_eq!(
            events,
            vec![
                PosEvent::DeviceStatusChanged {
                    device: Device::Pinpad,
                    status: Some(true)
                },
                PosEvent::DeviceStatusChanged {
                    device: Device::Pinpad,
                    status: Some(false)
                },
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_reports_busy_devices_as_working() {
        let coordinator = DeviceCoordinator::new();
        let supervisor = PrinterSupervisor::new(
            Arc::new(ScriptedDevices::with_printer(vec![Ok(false)])) as Arc<dyn DeviceManager>,
            Duration::ZERO,
        );
        let pinpad = FixedStatus::new(false);
        let Ok(_held) = coordinator
            .locks()
            .acquire(Device::Pinpad, AcquireMode::NonBlocking)
            .await
        else {
            panic!("pinpad lock free");
        };

        let snapshot = device_status(
            &coordinator,
            &supervisor,
            &StationId::from("s1"),
            None,
            Some(pinpad.as_ref() as &dyn StatusCheck),
        )
        .await;

        assert_eq!(
            snapshot,
            DeviceStatusSnapshot {
                sat: true,
                pinpad: true,
                printer: Some(true),
            }
        );
        assert_eq!(pinpad.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn till_delay_targets_same_day_before_hour() {
        assert_eq!(
            next_till_check_delay(at(5, 0), 6, Duration::ZERO),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn till_delay_targets_next_day_after_hour() {
        assert_eq!(
            next_till_check_delay(at(6, 0), 6, Duration::from_secs(30)),
            Duration::from_secs(24 * 3600 + 30)
        );
        assert_eq!(
            next_till_check_delay(at(18, 0), 6, Duration::ZERO),
            Duration::from_secs(12 * 3600)
        );
    }

    #[test]
    fn till_delay_has_a_floor() {
        let Some(almost) = at(5, 59).checked_add_signed(TimeDelta::seconds(50)) else {
            panic!("valid time");
        };
        assert_eq!(
            next_till_check_delay(almost, 6, Duration::ZERO),
            MIN_TILL_CHECK_DELAY
        );
    }

    #[tokio::test]
    async fn till_announce_carries_last_status() {
        let coordinator = Arc::new(DeviceCoordinator::new());
        let station = StationId::from("s1");
        let domain = InMemoryDomain::new([("tok".to_string(), Station::new("s1", "Caixa 1"))])
            .with_till_status(TillStatus::Open);
        let mut source = coordinator.events().subscribe(&station);
        let watch = TillDeadlineWatch::new(
            Arc::clone(&coordinator),
            Arc::new(domain),
            station,
            6,
            Duration::ZERO,
        );

        assert!(watch.announce().await.is_ok());
        let _ = source.next_event().await;
        let Some(event) = source.next_event().await else {
            panic!("till event");
        };
        assert_eq!(
            event,
            json!({"type": "CHECK_TILL_FINISHED", "lastTill": {"status": "open"}})
        );
    }

    #[derive(Debug, Default)]
    struct CountingSink {
        reports: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySink for CountingSink {
        async fn report(&self, _station: &StationId) -> Result<(), HubError> {
            self.reports.fetch_add(1, Ordering::SeqCst);
            Err(HubError::Domain("portal unreachable".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_reports_immediately_then_hourly_despite_errors() {
        let sink = Arc::new(CountingSink::default());
        let watch = TelemetryWatch::new(
            Arc::clone(&sink) as Arc<dyn TelemetrySink>,
            StationId::from("s1"),
        );
        let handle = tokio::spawn(watch.run(Duration::from_secs(3600)));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.reports.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(sink.reports.load(Ordering::SeqCst), 2);
        handle.abort();
    }

    fn poller_settings(developer_mode: bool) -> PollerSettings {
        PollerSettings {
            station: StationId::from("s1"),
            drawer_period: Duration::from_secs(1),
            sat_period: Duration::from_secs(300),
            pinpad_period: Duration::from_secs(60),
            telemetry_period: Duration::from_secs(3600),
            till_check_hour: 6,
            till_check_tolerance: Duration::ZERO,
            developer_mode,
        }
    }

    struct Rig {
        coordinator: Arc<DeviceCoordinator>,
        devices: Arc<ScriptedDevices>,
        sink: Arc<CountingSink>,
    }

    impl Rig {
        fn new(script: Vec<Result<bool, crate::device::DeviceFault>>) -> Self {
            Self {
                coordinator: Arc::new(DeviceCoordinator::new()),
                devices: Arc::new(ScriptedDevices::with_printer(script)),
                sink: Arc::new(CountingSink::default()),
            }
        }

        fn deps(
            &self,
            sat: Option<&Arc<FixedStatus>>,
            pinpad: Option<&Arc<FixedStatus>>,
        ) -> PollerDeps {
            let domain = InMemoryDomain::new([("tok".to_string(), Station::new("s1", "Caixa 1"))]);
            PollerDeps {
                coordinator: Arc::clone(&self.coordinator),
                supervisor: Arc::new(PrinterSupervisor::new(
                    Arc::clone(&self.devices) as Arc<dyn DeviceManager>,
                    Duration::ZERO,
                )),
                tills: Arc::new(domain),
                sat: sat.map(|p| Arc::clone(p) as Arc<dyn StatusCheck>),
                pinpad: pinpad.map(|p| Arc::clone(p) as Arc<dyn StatusCheck>),
                telemetry: Arc::clone(&self.sink) as Arc<dyn TelemetrySink>,
            }
        }

        fn drawer_checks(&self) -> usize {
            let Some(printer) = &self.devices.printer else {
                panic!("rig has a printer");
            };
            printer.drawer_reads.load(Ordering::SeqCst)
        }
    }

    fn calls(status: &FixedStatus) -> usize {
        status.calls.load(Ordering::SeqCst)
    }

    /// Next event that is not the daily till announcement, whose timing
    /// follows the wall clock.
    async fn next_status_event(source: &mut crate::domain::EventSource) -> serde_json::Value {
        loop {
            let Some(event) = source.next_event().await else {
                panic!("stream ended");
            };
            if event["type"] != "CHECK_TILL_FINISHED" {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_pollers_keep_their_periods() {
        let rig = Rig::new(vec![Ok(false)]);
        let _source = rig.coordinator.events().subscribe(&StationId::from("s1"));
        let sat = FixedStatus::new(true);
        let pinpad = FixedStatus::new(true);

        let handles = spawn_pollers(&poller_settings(false), rig.deps(Some(&sat), Some(&pinpad)));
        assert_eq!(handles.len(), 5);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rig.drawer_checks(), 1);
        assert_eq!((calls(&sat), calls(&pinpad)), (1, 1));
        assert_eq!(rig.sink.reports.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rig.drawer_checks(), 2);

        tokio::time::sleep(Duration::from_secs(58)).await;
        assert_eq!(rig.drawer_checks(), 60);
        assert_eq!(calls(&pinpad), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls(&pinpad), 2);

        tokio::time::sleep(Duration::from_secs(239)).await;
        assert_eq!((calls(&sat), calls(&pinpad)), (1, 5));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!((calls(&sat), calls(&pinpad)), (2, 6));

        tokio::time::sleep(Duration::from_secs(3299)).await;
        assert_eq!(rig.sink.reports.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rig.sink.reports.load(Ordering::SeqCst), 2);
        assert_eq!((calls(&sat), calls(&pinpad)), (13, 61));
        assert_eq!(rig.drawer_checks(), 3601);

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_sat_poller_without_a_sat() {
        let rig = Rig::new(vec![Ok(false)]);
        let _source = rig.coordinator.events().subscribe(&StationId::from("s1"));
        let pinpad = FixedStatus::new(true);

        let handles = spawn_pollers(&poller_settings(false), rig.deps(None, Some(&pinpad)));
        assert_eq!(handles.len(), 4);

        tokio::time::sleep(Duration::from_millis(300_500)).await;
        assert_eq!(calls(&pinpad), 6);
        assert!(!rig.coordinator.locks().lock_for(Device::Sat).is_locked());

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn developer_mode_skips_telemetry() {
        let rig = Rig::new(vec![Ok(false)]);
        let _source = rig.coordinator.events().subscribe(&StationId::from("s1"));

        let handles = spawn_pollers(&poller_settings(true), rig.deps(None, None));
        assert_eq!(handles.len(), 2);

        tokio::time::sleep(Duration::from_millis(7_200_500)).await;
        assert_eq!(rig.sink.reports.load(Ordering::SeqCst), 0);
        assert_eq!(rig.drawer_checks(), 7201);

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn status_changes_reach_station_at_period_boundaries() {
        let rig = Rig::new(vec![Ok(true), Ok(false)]);
        let mut source = rig.coordinator.events().subscribe(&StationId::from("s1"));
        let pinpad = FixedStatus::new(true);
        let start = tokio::time::Instant::now();

        let handles = spawn_pollers(&poller_settings(true), rig.deps(None, Some(&pinpad)));
        assert_eq!(source.next_event().await, Some(json!({})));

        let mut first = Vec::new();
        for _ in 0..3 {
            first.push(next_status_event(&mut source).await);
        }
        assert_eq!(start.elapsed().as_secs(), 0);
        for expected in [
            json!({"type": "DRAWER_ALERT_OPEN"}),
            json!({"type": "DEVICE_STATUS_CHANGED", "device": "printer", "status": true}),
            json!({"type": "DEVICE_STATUS_CHANGED", "device": "pinpad", "status": true}),
        ] {
            assert!(first.contains(&expected), "missing {expected} in {first:?}");
        }
        pinpad.ok.store(false, Ordering::SeqCst);

        assert_eq!(
            next_status_event(&mut source).await,
            json!({"type": "DRAWER_ALERT_CLOSE"})
        );
        assert_eq!(start.elapsed().as_secs(), 1);

        assert_eq!(
            next_status_event(&mut source).await,
            json!({"type": "DEVICE_STATUS_CHANGED", "device": "pinpad", "status": false})
        );
        assert_eq!(start.elapsed().as_secs(), 60);

        for handle in handles {
            handle.abort();
        }
    }
}
