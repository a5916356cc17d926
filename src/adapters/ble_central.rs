//! BLE central adapter.
//!
//! Implements [`PeripheralRadio`] over the Bluedroid GAP/GATTC client and
//! forwards every stack callback into the radio event queue through
//! [`RadioCallbacks`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid via raw `esp_idf_svc::sys`
//!   calls. The C callbacks cannot capture, so connection bookkeeping
//!   lives in a `Mutex`-guarded static and events go to
//!   [`RADIO_EVENTS`](crate::events::RADIO_EVENTS).
//! - **all other targets**: a simulated MIDI keyboard that answers each
//!   request with the callback a real stack would produce.

use log::{debug, info};

use crate::app::ports::{PeripheralRadio, RadioCallbacks};
use crate::error::RadioError;
use crate::events::RadioQueue;
use crate::pairing::device::{BdAddr, ServiceId};

#[cfg(not(target_os = "espidf"))]
use crate::pairing::device::DeviceRecord;

/// Scan window length; the stack reports scan-complete when it ends.
pub const SCAN_WINDOW_SECS: u32 = 10;

// ───────────────────────────────────────────────────────────────
// ESP-IDF callback state
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod stack {
    use std::sync::Mutex;

    use esp_idf_svc::sys::*;
    use log::{debug, error, info, warn};

    use crate::app::ports::RadioCallbacks;
    use crate::events::RADIO_EVENTS;
    use crate::pairing::adv::parse_advertisement;
    use crate::pairing::device::{BdAddr, ServiceId};

    /// Address types of recent sightings; random-address peripherals must
    /// be opened with the type they advertised.
    const MAX_ADDR_TYPES: usize = 8;

    pub(super) struct GattcState {
        pub gattc_if: esp_gatt_if_t,
        pub conn_id: Option<u16>,
        pub peer: Option<BdAddr>,
        pub target: u128,
        pub characteristic: u128,
        pub service_range: Option<(u16, u16)>,
        pub char_handle: u16,
        pub scan_duration: u32,
        pub addr_types: heapless::Vec<(BdAddr, esp_ble_addr_type_t), MAX_ADDR_TYPES>,
    }

    pub(super) static GATTC: Mutex<GattcState> = Mutex::new(GattcState {
        gattc_if: ESP_GATT_IF_NONE as esp_gatt_if_t,
        conn_id: None,
        peer: None,
        target: 0,
        characteristic: 0,
        service_range: None,
        char_handle: 0,
        scan_duration: super::SCAN_WINDOW_SECS,
        addr_types: heapless::Vec::new(),
    });

    pub(super) fn uuid_to_esp(id: ServiceId) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = ESP_UUID_LEN_128 as u16;
        t.uuid.uuid128 = id.to_le_bytes();
        t
    }

    fn uuid_from_esp(u: &esp_bt_uuid_t) -> Option<ServiceId> {
        unsafe {
            match u32::from(u.len) {
                ESP_UUID_LEN_16 => Some(ServiceId::from_short(u.uuid.uuid16)),
                ESP_UUID_LEN_128 => Some(ServiceId::from_le_bytes(u.uuid.uuid128)),
                _ => None,
            }
        }
    }

    pub(super) fn check(
        ret: esp_err_t,
        err: crate::error::RadioError,
    ) -> Result<(), crate::error::RadioError> {
        if ret == ESP_OK as i32 { Ok(()) } else { Err(err) }
    }

    pub(super) unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_PARAM_SET_COMPLETE_EVT => {
                let duration = GATTC.lock().map(|g| g.scan_duration).unwrap_or(super::SCAN_WINDOW_SECS);
                let ret = unsafe { esp_ble_gap_start_scanning(duration) };
                if ret != ESP_OK as i32 {
                    warn!("BLE: start_scanning failed ({})", ret);
                }
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RESULT_EVT => {
                let r = unsafe { &(*param).scan_rst };
                match r.search_evt {
                    esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_RES_EVT => {
                        let addr = BdAddr(r.bda);
                        let len = (r.adv_data_len as usize + r.scan_rsp_len as usize).min(r.ble_adv.len());
                        let record = parse_advertisement(addr, r.rssi as i8, &r.ble_adv[..len]);
                        if let Ok(mut g) = GATTC.lock() {
                            remember_addr_type(&mut g, addr, r.ble_addr_type);
                        }
                        RADIO_EVENTS.on_device_observed(record);
                    }
                    esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_CMPL_EVT => {
                        RADIO_EVENTS.on_scan_complete();
                    }
                    _ => {}
                }
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_STOP_COMPLETE_EVT => {
                debug!("BLE: scan stopped");
            }
            _ => {}
        }
    }

    fn remember_addr_type(g: &mut GattcState, addr: BdAddr, kind: esp_ble_addr_type_t) {
        if let Some(slot) = g.addr_types.iter_mut().find(|(a, _)| *a == addr) {
            slot.1 = kind;
            return;
        }
        if g.addr_types.is_full() {
            g.addr_types.remove(0);
        }
        let _ = g.addr_types.push((addr, kind));
    }

    pub(super) unsafe extern "C" fn gattc_event_handler(
        event: esp_gattc_cb_event_t,
        gattc_if: esp_gatt_if_t,
        param: *mut esp_ble_gattc_cb_param_t,
    ) {
        let Ok(mut g) = GATTC.lock() else {
            error!("BLE: GATTC state poisoned");
            return;
        };

        match event {
            esp_gattc_cb_event_t_ESP_GATTC_REG_EVT => {
                g.gattc_if = gattc_if;
                info!("BLE: GATTC registered (if={})", gattc_if);
            }
            esp_gattc_cb_event_t_ESP_GATTC_OPEN_EVT => {
                let p = unsafe { &(*param).open };
                let peer = BdAddr(p.remote_bda);
                let ok = p.status == esp_gatt_status_t_ESP_GATT_OK;
                if ok {
                    g.conn_id = Some(p.conn_id);
                    g.peer = Some(peer);
                    g.service_range = None;
                    g.char_handle = 0;
                }
                drop(g);
                RADIO_EVENTS.on_connected(peer, ok);
            }
            esp_gattc_cb_event_t_ESP_GATTC_SEARCH_RES_EVT => {
                let p = unsafe { &(*param).search_res };
                if let Some(id) = uuid_from_esp(&p.srvc_id.uuid) {
                    if id.0 == g.target {
                        g.service_range = Some((p.start_handle, p.end_handle));
                    } else if let Some(peer) = g.peer {
                        drop(g);
                        RADIO_EVENTS.on_service_resolved(peer, Some(id));
                    }
                }
            }
            esp_gattc_cb_event_t_ESP_GATTC_SEARCH_CMPL_EVT => {
                let Some(peer) = g.peer else { return };
                let found = g.service_range.map(|_| ServiceId(g.target));
                drop(g);
                RADIO_EVENTS.on_service_resolved(peer, found);
            }
            esp_gattc_cb_event_t_ESP_GATTC_REG_FOR_NOTIFY_EVT => {
                let p = unsafe { &(*param).reg_for_notify };
                if p.status != esp_gatt_status_t_ESP_GATT_OK {
                    warn!("BLE: register_for_notify failed ({})", p.status);
                    return;
                }
                if let Some(conn_id) = g.conn_id {
                    enable_cccd(g.gattc_if, conn_id, p.handle);
                }
            }
            esp_gattc_cb_event_t_ESP_GATTC_NOTIFY_EVT => {
                let p = unsafe { &(*param).notify };
                let data = unsafe { core::slice::from_raw_parts(p.value, p.value_len as usize) };
                let peer = BdAddr(p.remote_bda);
                drop(g);
                RADIO_EVENTS.on_notification(peer, data);
            }
            esp_gattc_cb_event_t_ESP_GATTC_DISCONNECT_EVT => {
                let p = unsafe { &(*param).disconnect };
                let peer = BdAddr(p.remote_bda);
                if g.peer == Some(peer) {
                    g.conn_id = None;
                    g.peer = None;
                }
                drop(g);
                RADIO_EVENTS.on_disconnected(peer);
            }
            _ => {}
        }
    }

    /// Write 0x0001 to the client characteristic configuration descriptor.
    fn enable_cccd(gattc_if: esp_gatt_if_t, conn_id: u16, char_handle: u16) {
        let mut descr: esp_gattc_descr_elem_t = unsafe { core::mem::zeroed() };
        let mut count: u16 = 1;
        let cccd = uuid_short(ESP_GATT_UUID_CHAR_CLIENT_CONFIG as u16);
        let status = unsafe {
            esp_ble_gattc_get_descr_by_char_handle(
                gattc_if,
                conn_id,
                char_handle,
                cccd,
                &mut descr,
                &mut count,
            )
        };
        if status != esp_gatt_status_t_ESP_GATT_OK || count == 0 {
            warn!("BLE: no CCCD on handle {}", char_handle);
            return;
        }
        let mut enable: [u8; 2] = [0x01, 0x00];
        let ret = unsafe {
            esp_ble_gattc_write_char_descr(
                gattc_if,
                conn_id,
                descr.handle,
                enable.len() as u16,
                enable.as_mut_ptr(),
                esp_gatt_write_type_t_ESP_GATT_WRITE_TYPE_RSP,
                esp_gatt_auth_req_t_ESP_GATT_AUTH_REQ_NONE,
            )
        };
        if ret != ESP_OK as i32 {
            warn!("BLE: CCCD write failed ({})", ret);
        }
    }

    fn uuid_short(short: u16) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = ESP_UUID_LEN_16 as u16;
        t.uuid.uuid16 = short;
        t
    }

    pub(super) fn addr_type_of(g: &GattcState, peer: &BdAddr) -> esp_ble_addr_type_t {
        g.addr_types
            .iter()
            .find(|(a, _)| a == peer)
            .map(|(_, t)| *t)
            .unwrap_or(esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC)
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct BleCentral {
    /// Callback sink for the simulated stack.
    #[cfg(not(target_os = "espidf"))]
    events: &'static RadioQueue,
    #[cfg(not(target_os = "espidf"))]
    sim: SimPeripheral,
    initialised: bool,
}

/// What the simulated stack reports.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
pub struct SimPeripheral {
    pub record: DeviceRecord,
    /// Services found on resolution, in discovery order.
    pub services: heapless::Vec<ServiceId, 4>,
    /// Connected peer, if any.
    connected: Option<BdAddr>,
}

#[cfg(not(target_os = "espidf"))]
impl Default for SimPeripheral {
    fn default() -> Self {
        let mut services = heapless::Vec::new();
        let _ = services.push(ServiceId::MIDI);
        Self {
            record: DeviceRecord::new(BdAddr([0xC4, 0x4F, 0x33, 0x0A, 0x1B, 0x2C]), -58)
                .with_name("Digital Piano")
                .with_service(ServiceId::MIDI),
            services,
            connected: None,
        }
    }
}

impl BleCentral {
    /// Simulated central reporting into `events`.
    #[cfg(not(target_os = "espidf"))]
    pub fn new(events: &'static RadioQueue, sim: SimPeripheral) -> Self {
        Self {
            events,
            sim,
            initialised: true,
        }
    }

    /// Bring up the controller in BLE mode and register the GAP and GATTC
    /// callbacks. Callbacks are delivered to [`RADIO_EVENTS`](crate::events::RADIO_EVENTS).
    #[cfg(target_os = "espidf")]
    pub fn new(
        _events: &'static RadioQueue,
        target: ServiceId,
        characteristic: ServiceId,
    ) -> Result<Self, RadioError> {
        use esp_idf_svc::sys::*;

        if let Ok(mut g) = stack::GATTC.lock() {
            g.target = target.0;
            g.characteristic = characteristic.0;
        }

        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);
            let mut bt_cfg = esp_bt_controller_config_t::default();
            stack::check(esp_bt_controller_init(&mut bt_cfg), RadioError::StackUnavailable)?;
            stack::check(
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                RadioError::StackUnavailable,
            )?;
            stack::check(esp_bluedroid_init(), RadioError::StackUnavailable)?;
            stack::check(esp_bluedroid_enable(), RadioError::StackUnavailable)?;
            stack::check(
                esp_ble_gap_register_callback(Some(stack::gap_event_handler)),
                RadioError::StackUnavailable,
            )?;
            stack::check(
                esp_ble_gattc_register_callback(Some(stack::gattc_event_handler)),
                RadioError::StackUnavailable,
            )?;
            stack::check(esp_ble_gattc_app_register(0), RadioError::StackUnavailable)?;
        }
        info!("BLE: central ready (target {})", target);
        Ok(Self { initialised: true })
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Simulation: deliver a notification from the connected peripheral.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_notify(&self, data: &[u8]) {
        if let Some(peer) = self.sim.connected {
            self.events.on_notification(peer, data);
        }
    }

    /// Simulation: the peripheral drops the link.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_drop_link(&mut self) {
        if let Some(peer) = self.sim.connected.take() {
            info!("BLE(sim): {} dropped the link", peer);
            self.events.on_disconnected(peer);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// PeripheralRadio — ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl PeripheralRadio for BleCentral {
    fn start_scan(&mut self) -> Result<(), RadioError> {
        use esp_idf_svc::sys::*;
        let mut params = esp_ble_scan_params_t {
            scan_type: esp_ble_scan_type_t_BLE_SCAN_TYPE_ACTIVE,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            scan_filter_policy: esp_ble_scan_filter_t_BLE_SCAN_FILTER_ALLOW_ALL,
            scan_interval: 0x50,
            scan_window: 0x30,
            scan_duplicate: esp_ble_scan_duplicate_t_BLE_SCAN_DUPLICATE_DISABLE,
        };
        // Scanning itself starts from the param-set-complete callback.
        stack::check(unsafe { esp_ble_gap_set_scan_params(&mut params) }, RadioError::ScanFailed)
    }

    fn stop_scan(&mut self) {
        let ret = unsafe { esp_idf_svc::sys::esp_ble_gap_stop_scanning() };
        debug!("BLE: stop_scanning -> {}", ret);
    }

    fn connect(&mut self, peer: &BdAddr) -> Result<(), RadioError> {
        let (gattc_if, addr_type) = {
            let g = stack::GATTC.lock().map_err(|_| RadioError::StackUnavailable)?;
            (g.gattc_if, stack::addr_type_of(&g, peer))
        };
        let mut bda = peer.0;
        info!("BLE: opening {}", peer);
        stack::check(
            unsafe { esp_idf_svc::sys::esp_ble_gattc_open(gattc_if, bda.as_mut_ptr(), addr_type, true) },
            RadioError::ConnectFailed,
        )
    }

    fn resolve_services(&mut self, peer: &BdAddr, _target: ServiceId) -> Result<(), RadioError> {
        let g = stack::GATTC.lock().map_err(|_| RadioError::StackUnavailable)?;
        let conn_id = match (g.peer, g.conn_id) {
            (Some(p), Some(id)) if p == *peer => id,
            _ => return Err(RadioError::NotConnected),
        };
        let gattc_if = g.gattc_if;
        drop(g);
        // Unfiltered search so every service is reported, not only the target.
        stack::check(
            unsafe {
                esp_idf_svc::sys::esp_ble_gattc_search_service(gattc_if, conn_id, core::ptr::null_mut())
            },
            RadioError::DiscoveryFailed,
        )
    }

    fn subscribe(
        &mut self,
        peer: &BdAddr,
        _service: ServiceId,
        characteristic: ServiceId,
    ) -> Result<(), RadioError> {
        use esp_idf_svc::sys::*;
        let mut g = stack::GATTC.lock().map_err(|_| RadioError::StackUnavailable)?;
        let (Some(conn_id), Some((start, end))) = (g.conn_id, g.service_range) else {
            return Err(RadioError::NotConnected);
        };

        let mut elem: esp_gattc_char_elem_t = unsafe { core::mem::zeroed() };
        let mut count: u16 = 1;
        let status = unsafe {
            esp_ble_gattc_get_char_by_uuid(
                g.gattc_if,
                conn_id,
                start,
                end,
                stack::uuid_to_esp(characteristic),
                &mut elem,
                &mut count,
            )
        };
        if status != esp_gatt_status_t_ESP_GATT_OK || count == 0 {
            return Err(RadioError::SubscribeFailed);
        }
        g.char_handle = elem.char_handle;

        let mut bda = peer.0;
        stack::check(
            unsafe { esp_ble_gattc_register_for_notify(g.gattc_if, bda.as_mut_ptr(), elem.char_handle) },
            RadioError::SubscribeFailed,
        )
    }

    fn write(&mut self, _peer: &BdAddr, data: &[u8]) -> Result<(), RadioError> {
        use esp_idf_svc::sys::*;
        let g = stack::GATTC.lock().map_err(|_| RadioError::StackUnavailable)?;
        let Some(conn_id) = g.conn_id else {
            return Err(RadioError::NotConnected);
        };
        if g.char_handle == 0 {
            return Err(RadioError::WriteFailed);
        }
        let mut buf: heapless::Vec<u8, 20> = heapless::Vec::new();
        buf.extend_from_slice(data).map_err(|_| RadioError::WriteFailed)?;
        stack::check(
            unsafe {
                esp_ble_gattc_write_char(
                    g.gattc_if,
                    conn_id,
                    g.char_handle,
                    buf.len() as u16,
                    buf.as_mut_ptr(),
                    esp_gatt_write_type_t_ESP_GATT_WRITE_TYPE_NO_RSP,
                    esp_gatt_auth_req_t_ESP_GATT_AUTH_REQ_NONE,
                )
            },
            RadioError::WriteFailed,
        )
    }

    fn disconnect(&mut self, peer: &BdAddr) {
        use esp_idf_svc::sys::*;
        let (gattc_if, conn_id) = match stack::GATTC.lock() {
            Ok(g) => (g.gattc_if, g.conn_id.filter(|_| g.peer == Some(*peer))),
            Err(_) => return,
        };
        let mut bda = peer.0;
        unsafe {
            if let Some(id) = conn_id {
                esp_ble_gattc_close(gattc_if, id);
            }
            // Also cancels an open that has not completed yet.
            esp_ble_gap_disconnect(bda.as_mut_ptr());
        }
        info!("BLE: released {}", peer);
    }
}

// ───────────────────────────────────────────────────────────────
// PeripheralRadio — simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl PeripheralRadio for BleCentral {
    fn start_scan(&mut self) -> Result<(), RadioError> {
        info!("BLE(sim): scanning");
        self.events.on_device_observed(self.sim.record.clone());
        Ok(())
    }

    fn stop_scan(&mut self) {
        debug!("BLE(sim): scan stopped");
    }

    fn connect(&mut self, peer: &BdAddr) -> Result<(), RadioError> {
        let ok = *peer == self.sim.record.address;
        if ok {
            self.sim.connected = Some(*peer);
        }
        self.events.on_connected(*peer, ok);
        Ok(())
    }

    fn resolve_services(&mut self, peer: &BdAddr, target: ServiceId) -> Result<(), RadioError> {
        if self.sim.connected != Some(*peer) {
            return Err(RadioError::NotConnected);
        }
        for s in self.sim.services.iter().filter(|s| **s != target) {
            self.events.on_service_resolved(*peer, Some(*s));
        }
        let found = self.sim.services.contains(&target).then_some(target);
        self.events.on_service_resolved(*peer, found);
        Ok(())
    }

    fn subscribe(&mut self, peer: &BdAddr, _s: ServiceId, _c: ServiceId) -> Result<(), RadioError> {
        if self.sim.connected != Some(*peer) {
            return Err(RadioError::NotConnected);
        }
        info!("BLE(sim): subscribed to {}", peer);
        Ok(())
    }

    fn write(&mut self, peer: &BdAddr, data: &[u8]) -> Result<(), RadioError> {
        if self.sim.connected != Some(*peer) {
            return Err(RadioError::NotConnected);
        }
        debug!("BLE(sim): wrote {} bytes to {}", data.len(), peer);
        Ok(())
    }

    fn disconnect(&mut self, peer: &BdAddr) {
        if self.sim.connected == Some(*peer) {
            self.sim.connected = None;
            info!("BLE(sim): released {}", peer);
        }
    }
}
