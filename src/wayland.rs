use anyhow::Result;
use memmap2::MmapMut;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::memfd::{MemFdCreateFlag, memfd_create};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::os::fd::AsFd;
use wayland_client::{
    Connection, Dispatch, EventQueue, Proxy, QueueHandle, delegate_noop,
    protocol::{wl_output, wl_registry},
};
use wayland_protocols_wlr::gamma_control::v1::client::{
    zwlr_gamma_control_manager_v1, zwlr_gamma_control_v1,
};

use crate::display::{ControllerHandle, GammaDisplay};
use crate::error::DisplayError;
use crate::ramp::GammaRamp;

#[derive(Clone, Copy)]
pub struct OutputData {
    pub id: u32,
}

#[derive(Clone, Copy)]
pub struct GammaData {
    pub id: u32,
}

/// Where an output stands with the compositor's gamma manager.
#[derive(Debug, Default)]
pub enum GammaControl {
    #[default]
    Unrequested,
    Active(zwlr_gamma_control_v1::ZwlrGammaControlV1),
    /// The compositor refused; asking again would only fail again.
    Failed,
}

impl GammaControl {
    pub fn needs_request(&self) -> bool {
        matches!(self, GammaControl::Unrequested)
    }

    pub fn active(&self) -> Option<&zwlr_gamma_control_v1::ZwlrGammaControlV1> {
        match self {
            GammaControl::Active(gamma) => Some(gamma),
            _ => None,
        }
    }

    /// A failed control is inert, so it is destroyed right away.
    pub fn fail(&mut self) {
        std::mem::replace(self, GammaControl::Failed).release();
    }

    pub fn release(self) {
        if let GammaControl::Active(gamma) = self {
            gamma.destroy();
        }
    }
}

pub struct OutputState {
    pub name: Option<String>,
    pub wl_output: wl_output::WlOutput,
    pub gamma: GammaControl,
    pub ramp_size: u32,
    pub table: Option<(File, MmapMut)>,
    /// Last ramp written by this process.
    pub current: Option<GammaRamp>,
}

impl OutputState {
    fn disable_gamma(&mut self) {
        self.gamma.fail();
        self.table = None;
        self.ramp_size = 0;
        self.current = None;
    }
}

pub struct AppState {
    /// Keyed by registry name, which also gives the controller order.
    pub outputs: BTreeMap<u32, OutputState>,
    pub gamma_mgr: Option<zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1>,
    pub gamma_mgr_name: Option<u32>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            outputs: BTreeMap::new(),
            gamma_mgr: None,
            gamma_mgr_name: None,
        }
    }

    pub fn ensure_gamma_for(&mut self, qh: &QueueHandle<Self>, id: u32) {
        let Some(mgr) = self.gamma_mgr.clone() else {
            return;
        };
        let Some(output) = self.outputs.get_mut(&id) else {
            return;
        };
        if !output.gamma.needs_request() {
            return;
        }
        let gamma = mgr.get_gamma_control(&output.wl_output, qh, GammaData { id });
        output.gamma = GammaControl::Active(gamma);
    }

    pub fn ensure_gamma_all(&mut self, qh: &QueueHandle<Self>) {
        let ids: Vec<u32> = self.outputs.keys().copied().collect();
        for id in ids {
            self.ensure_gamma_for(qh, id);
        }
    }

    pub fn remove_output(&mut self, id: u32) {
        if let Some(output) = self.outputs.remove(&id) {
            output.gamma.release();
        }
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for AppState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                if interface == wl_output::WlOutput::interface().name {
                    let wl_output = registry.bind::<wl_output::WlOutput, _, _>(
                        name,
                        version.min(4),
                        qh,
                        OutputData { id: name },
                    );
                    state.outputs.insert(
                        name,
                        OutputState {
                            name: None,
                            wl_output,
                            gamma: GammaControl::Unrequested,
                            ramp_size: 0,
                            table: None,
                            current: None,
                        },
                    );
                    state.ensure_gamma_for(qh, name);
                } else if interface
                    == zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1::interface().name
                {
                    let mgr = registry
                        .bind::<zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1, _, _>(
                            name,
                            1,
                            qh,
                            (),
                        );
                    state.gamma_mgr = Some(mgr);
                    state.gamma_mgr_name = Some(name);
                    state.ensure_gamma_all(qh);
                }
            }
            wl_registry::Event::GlobalRemove { name } => {
                if state.gamma_mgr_name == Some(name) {
                    state.gamma_mgr = None;
                    state.gamma_mgr_name = None;
                }
                state.remove_output(name);
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, OutputData> for AppState {
    fn event(
        state: &mut Self,
        _: &wl_output::WlOutput,
        event: wl_output::Event,
        data: &OutputData,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let label = match event {
            wl_output::Event::Name { name } => name,
            wl_output::Event::Description { description } => description,
            _ => return,
        };
        if let Some(output) = state.outputs.get_mut(&data.id) {
            output.name = Some(label);
        }
    }
}

impl Dispatch<zwlr_gamma_control_v1::ZwlrGammaControlV1, GammaData> for AppState {
    fn event(
        state: &mut Self,
        _: &zwlr_gamma_control_v1::ZwlrGammaControlV1,
        event: zwlr_gamma_control_v1::Event,
        data: &GammaData,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let Some(output) = state.outputs.get_mut(&data.id) else {
            return;
        };
        match event {
            zwlr_gamma_control_v1::Event::GammaSize { size } => {
                output.ramp_size = size;
                output.current = None;
                match create_gamma_table(size as usize) {
                    Ok(table) => output.table = Some(table),
                    Err(err) => {
                        tracing::warn!(output = ?output.name, "failed to allocate gamma table: {err}");
                        output.table = None;
                        output.ramp_size = 0;
                    }
                }
            }
            zwlr_gamma_control_v1::Event::Failed => {
                tracing::warn!(
                    output = ?output.name,
                    "gamma control failed, is another gamma tool running?"
                );
                output.disable_gamma();
            }
            _ => {}
        }
    }
}

delegate_noop!(AppState: ignore zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1);

/// Anonymous memory holding one planar R|G|B table of `ramp_size` entries.
pub fn create_gamma_table(ramp_size: usize) -> Result<(File, MmapMut), DisplayError> {
    let fd = memfd_create(c"wlsct-gamma", MemFdCreateFlag::MFD_CLOEXEC)
        .map_err(std::io::Error::from)?;
    let file = File::from(fd);
    file.set_len((ramp_size * 3 * std::mem::size_of::<u16>()) as u64)?;
    let mmap = unsafe { MmapMut::map_mut(&file)? };
    Ok((file, mmap))
}

/// A compositor connection exposing one screen whose controllers are the
/// outputs, in registry order.
pub struct WaylandDisplay {
    conn: Connection,
    queue: EventQueue<AppState>,
    state: AppState,
}

impl WaylandDisplay {
    pub fn connect() -> Result<Self, DisplayError> {
        let conn = Connection::connect_to_env()?;
        let mut queue = conn.new_event_queue();
        let qh = queue.handle();
        conn.display().get_registry(&qh, ());

        let mut state = AppState::new();
        queue.roundtrip(&mut state)?;
        if state.gamma_mgr.is_none() {
            return Err(DisplayError::MissingGammaManager);
        }
        state.ensure_gamma_all(&qh);
        queue.roundtrip(&mut state)?;

        Ok(Self { conn, queue, state })
    }

    pub fn flush(&self) -> Result<(), DisplayError> {
        self.conn.flush()?;
        Ok(())
    }

    /// Controls created for outputs that appeared since the last call still
    /// need a roundtrip before their ramp size is known.
    pub fn refresh(&mut self) -> Result<(), DisplayError> {
        let qh = self.queue.handle();
        self.state.ensure_gamma_all(&qh);
        self.queue.dispatch_pending(&mut self.state)?;
        Ok(())
    }

    /// Reads whatever the compositor has sent without blocking.
    pub fn read_events(&mut self) -> Result<()> {
        self.queue.dispatch_pending(&mut self.state)?;
        if let Some(guard) = self.queue.prepare_read() {
            let conn_fd = guard.connection_fd();
            let mut fds = [PollFd::new(
                conn_fd,
                PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP,
            )];
            match poll(&mut fds, PollTimeout::ZERO) {
                Ok(0) => {
                    // no events, drop guard to cancel read
                }
                Ok(_) => {
                    let conn_ready = fds[0].revents().is_some_and(|flags| {
                        flags.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP)
                    });
                    if conn_ready {
                        guard.read()?;
                    }
                }
                Err(nix::errno::Errno::EINTR) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.queue.dispatch_pending(&mut self.state)?;
        Ok(())
    }
}

impl GammaDisplay for WaylandDisplay {
    fn screen_count(&self) -> usize {
        1
    }

    fn controllers(&self, screen: usize) -> Vec<ControllerHandle> {
        if screen != 0 {
            return Vec::new();
        }
        self.state
            .outputs
            .iter()
            .map(|(&id, output)| ControllerHandle {
                id,
                ramp_size: if output.table.is_some() {
                    output.ramp_size as usize
                } else {
                    0
                },
            })
            .collect()
    }

    fn get_ramp(&self, controller: &ControllerHandle) -> Option<GammaRamp> {
        let output = self.state.outputs.get(&controller.id)?;
        if output.ramp_size == 0 {
            return None;
        }
        // The protocol cannot read back hardware state, a fresh control
        // starts from the compositor's linear ramp.
        Some(
            output
                .current
                .clone()
                .unwrap_or_else(|| GammaRamp::identity(output.ramp_size as usize)),
        )
    }

    fn set_ramp(
        &mut self,
        controller: &ControllerHandle,
        ramp: &GammaRamp,
    ) -> Result<(), DisplayError> {
        let Some(output) = self.state.outputs.get_mut(&controller.id) else {
            return Ok(());
        };
        let size = output.ramp_size as usize;
        if ramp.size() != size {
            return Err(DisplayError::RampSize {
                expected: size,
                got: ramp.size(),
            });
        }
        let (Some(gamma), Some((file, mmap))) = (output.gamma.active(), output.table.as_mut())
        else {
            return Ok(());
        };
        ramp.write_planar(bytemuck::cast_slice_mut::<u8, u16>(mmap));
        file.seek(SeekFrom::Start(0))?;
        tracing::info!(
            "Applying gamma to output {:?} (ramp_size: {})",
            output.name,
            size
        );
        gamma.set_gamma(file.as_fd());
        output.current = Some(ramp.clone());
        Ok(())
    }
}
