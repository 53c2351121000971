mod sprites;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use sprites::{SpriteRenderer, collect_batches, point_half_extent, view_projection};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::{self, SurfaceError};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes},
};

use crate::{
    config::CameraOptions,
    error::Error,
    events::{BuildGallery, GalleryBuilt, ViewerCommand},
    state::AppState,
    world::World,
};

const TITLE: &str = "Particle Greeting";

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
}

type CommandReceiver = mpsc::Receiver<ViewerCommand>;
type BuiltReceiver = mpsc::Receiver<GalleryBuilt>;
type BuildSender = mpsc::Sender<BuildGallery>;

/// Channels connecting the render loop to the background tasks.
pub struct ViewerLinks {
    pub control: CommandReceiver,
    pub built: BuiltReceiver,
    pub to_builder: BuildSender,
}

/// Apply one control message to the world.
pub fn apply_command(world: &mut World, cmd: ViewerCommand) {
    match cmd {
        ViewerCommand::Gesture(reading) => {
            world.apply_gesture(reading);
        }
        ViewerCommand::SetState(state) => {
            world.set_state(state);
        }
        ViewerCommand::SetGalleryImages(images) => world.request_rebuild(images),
    }
}

/// Apply every queued input to the world without blocking.
pub fn drain_inputs(world: &mut World, links: &mut ViewerLinks) {
    loop {
        match links.control.try_recv() {
            Ok(cmd) => apply_command(world, cmd),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    loop {
        match links.built.try_recv() {
            Ok(built) => world.on_gallery_built(built),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

/// Hand any pending gallery build to the builder task.
pub fn dispatch_rebuild(world: &mut World, links: &ViewerLinks) {
    let Some(ticket) = world.take_rebuild() else {
        return;
    };
    let generation = ticket.generation;
    if let Err(err) = links.to_builder.try_send(BuildGallery(ticket)) {
        warn!(generation, "failed to queue gallery build: {err}");
        world.on_gallery_built(GalleryBuilt {
            generation,
            result: Err(Error::BuilderUnavailable),
        });
    }
}

fn state_for_key(key: &Key) -> Option<AppState> {
    match key {
        Key::Character(ch) => match ch.as_str() {
            "1" => Some(AppState::Tree),
            "2" => Some(AppState::Explode),
            "3" => Some(AppState::Photo),
            "4" => Some(AppState::Heart),
            _ => None,
        },
        _ => None,
    }
}

struct ViewerApp {
    camera: CameraOptions,
    world: World,
    links: ViewerLinks,
    cancel: CancellationToken,
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    surface_config: Option<wgpu::SurfaceConfiguration>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    sprites: Option<SpriteRenderer>,
    title: String,
}

impl ViewerApp {
    fn new(camera: CameraOptions, world: World, links: ViewerLinks, cancel: CancellationToken) -> Self {
        Self {
            camera,
            world,
            links,
            cancel,
            window: None,
            surface: None,
            surface_config: None,
            device: None,
            queue: None,
            sprites: None,
            title: TITLE.to_string(),
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let attrs = WindowAttributes::default().with_title(TITLE);
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create viewer window");
                None
            }
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .unwrap_or(caps.formats[0]);

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "viewer surface configured",
        );

        self.sprites = Some(SpriteRenderer::new(&device, format));
        self.surface = Some(surface);
        self.surface_config = Some(config);
        self.device = Some(device);
        self.queue = Some(queue);
        Ok(())
    }

    fn handle_resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        let (Some(surface), Some(device), Some(config)) = (
            self.surface.as_ref(),
            self.device.as_ref(),
            self.surface_config.as_mut(),
        ) else {
            return;
        };
        config.width = new_size.width.max(1);
        config.height = new_size.height.max(1);
        surface.configure(device, config);
        debug!(
            width = config.width,
            height = config.height,
            "viewer surface resized",
        );
        self.request_redraw();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        if matches!(event.logical_key, Key::Named(NamedKey::Escape)) {
            info!("escape pressed; closing viewer");
            event_loop.exit();
            return;
        }
        if let Some(state) = state_for_key(&event.logical_key) {
            debug!(%state, "manual state override");
            apply_command(&mut self.world, ViewerCommand::SetState(state));
        }
    }

    fn update_title(&mut self) {
        let wanted = if self.world.message_visible() {
            format!("{TITLE} - {}", self.world.message())
        } else {
            TITLE.to_string()
        };
        if wanted != self.title {
            if let Some(window) = self.window.as_ref() {
                window.set_title(&wanted);
            }
            self.title = wanted;
        }
    }

    fn step(&mut self) {
        let now = Instant::now();
        drain_inputs(&mut self.world, &mut self.links);
        self.world.frame(now);
        dispatch_rebuild(&mut self.world, &self.links);
        self.update_title();
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        self.step();

        let Some(acquired) = self.surface.as_ref().map(|s| s.get_current_texture()) else {
            return;
        };
        let frame = match acquired {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                self.reconfigure();
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("viewer surface out of memory; exiting event loop");
                event_loop.exit();
                return;
            }
            Err(SurfaceError::Timeout) => {
                warn!("viewer surface acquisition timed out");
                return;
            }
            Err(SurfaceError::Other) => {
                warn!("viewer surface reported an unknown error; retrying");
                self.reconfigure();
                return;
            }
        };

        let (Some(device), Some(queue), Some(config), Some(sprites)) = (
            self.device.as_ref(),
            self.queue.as_ref(),
            self.surface_config.as_ref(),
            self.sprites.as_mut(),
        ) else {
            return;
        };

        let aspect = config.width as f32 / config.height as f32;
        let batches = collect_batches(&self.world, point_half_extent(&self.camera));
        sprites.prepare(device, queue, view_projection(&self.camera, aspect), &batches);

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("viewer-encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("particles"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            sprites.draw(&mut pass);
        }

        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }

    fn reconfigure(&mut self) {
        if let Some(size) = self.window.as_ref().map(|w| w.inner_size()) {
            self.handle_resize(size);
        }
    }

    fn request_redraw(&self) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.device.is_none() {
            if let Err(err) = self.init_gpu(window) {
                error!(error = ?err, "failed to initialize GPU state");
                event_loop.exit();
                return;
            }
        }

        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_key(event_loop, &event);
            }
            WindowEvent::RedrawRequested => {
                self.draw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // continuous animation: one redraw per display refresh
        self.request_redraw();
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
        }
    }
}

/// Run the windowed render loop on the calling thread until the window
/// closes or `cancel` fires.
pub fn run_windowed(
    camera: CameraOptions,
    world: World,
    links: ViewerLinks,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let mut app = ViewerApp::new(camera, world, links, cancel);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("viewer event loop failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::gesture::GestureReading;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup() -> (World, ViewerLinks, mpsc::Sender<ViewerCommand>, mpsc::Receiver<BuildGallery>) {
        let mut cfg = Configuration::default();
        cfg.gallery.count = 20;
        let mut rng = StdRng::seed_from_u64(61);
        let world = World::new(&cfg, &[], &mut rng, Instant::now()).unwrap();
        let (control_tx, control) = mpsc::channel(8);
        let (_built_tx, built) = mpsc::channel(8);
        let (to_builder, builder_rx) = mpsc::channel(4);
        (
            world,
            ViewerLinks {
                control,
                built,
                to_builder,
            },
            control_tx,
            builder_rx,
        )
    }

    #[test]
    fn number_keys_select_states() {
        let key = |s: &str| Key::Character(s.into());
        assert_eq!(state_for_key(&key("1")), Some(AppState::Tree));
        assert_eq!(state_for_key(&key("4")), Some(AppState::Heart));
        assert_eq!(state_for_key(&key("x")), None);
        assert_eq!(state_for_key(&Key::Named(NamedKey::Enter)), None);
    }

    #[test]
    fn inputs_are_applied_in_order() {
        let (mut world, mut links, control_tx, _builder_rx) = setup();
        control_tx
            .try_send(ViewerCommand::Gesture(GestureReading {
                state: AppState::Explode,
                hand_x: Some(0.2),
            }))
            .unwrap();
        control_tx
            .try_send(ViewerCommand::SetState(AppState::Photo))
            .unwrap();
        drain_inputs(&mut world, &mut links);
        assert_eq!(world.state(), AppState::Photo);
        assert_eq!(world.hand_x(), 0.2);
    }

    #[test]
    fn key_override_goes_through_the_command_path() {
        let (mut world, _links, _control_tx, _builder_rx) = setup();
        let state = state_for_key(&Key::Character("3".into())).unwrap();
        apply_command(&mut world, ViewerCommand::SetState(state));
        assert_eq!(world.state(), AppState::Photo);
        apply_command(&mut world, ViewerCommand::SetState(AppState::Photo));
        assert_eq!(world.state(), AppState::Photo);
    }

    #[test]
    fn pending_build_is_dispatched_once() {
        let (mut world, links, _control_tx, mut builder_rx) = setup();
        dispatch_rebuild(&mut world, &links);
        dispatch_rebuild(&mut world, &links);
        assert!(builder_rx.try_recv().is_ok());
        assert!(builder_rx.try_recv().is_err());
    }

    #[test]
    fn closed_builder_fails_the_build() {
        let (mut world, links, _control_tx, builder_rx) = setup();
        drop(builder_rx);
        dispatch_rebuild(&mut world, &links);
        assert!(!world.is_building());
        assert!(!world.gallery().is_ready());
    }
}
