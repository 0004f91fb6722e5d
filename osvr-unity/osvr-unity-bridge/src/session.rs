//! Render-manager session: the single manager instance plus the latest per-eye RenderInfo.

use stereo_api::{
    BridgeError, BridgeResult, ClientContext, DeviceBinding, Eye, OpenStatus, Pose, ProjectionMatrix, RenderBuffer,
    RenderInfo, RenderManager, RenderManagerFactory, Viewport,
};

pub struct RenderManagerSession {
    manager: Box<dyn RenderManager>,
    client: ClientContext,
    render_info: Vec<RenderInfo>,
}

impl RenderManagerSession {
    /// Build the manager on `binding`, open the display and fetch RenderInfo once.
    pub fn create(
        factory: &dyn RenderManagerFactory,
        client: ClientContext,
        binding: &DeviceBinding,
    ) -> BridgeResult<Self> {
        let mut manager = factory.create(client, binding)?;
        if !manager.doing_okay() {
            return Err(BridgeError::CreationFailed("render-manager is not doing okay".to_string()));
        }
        match manager.open_display() {
            OpenStatus::Failure => return Err(BridgeError::DisplayOpenFailed),
            OpenStatus::Partial => log::warn!("Display opened partially"),
            OpenStatus::Complete => {}
        }
        let render_info = manager.render_info();
        log::info!("Success!");
        Ok(Self { manager, client, render_info })
    }

    pub fn client(&self) -> ClientContext {
        self.client
    }

    /// Replace the stored RenderInfo with the manager's current view.
    pub fn refresh_render_info(&mut self) -> &[RenderInfo] {
        self.render_info = self.manager.render_info();
        &self.render_info
    }

    pub fn render_info(&self) -> &[RenderInfo] {
        &self.render_info
    }

    pub fn info_of(&self, eye: Eye) -> BridgeResult<&RenderInfo> {
        if self.render_info.is_empty() {
            return Err(BridgeError::NoRenderInfo);
        }
        self.render_info
            .get(eye.index())
            .ok_or(BridgeError::EyeOutOfRange(eye.index() as i32))
    }

    pub fn viewport_of(&self, eye: Eye) -> BridgeResult<Viewport> {
        self.info_of(eye).map(|info| info.viewport)
    }

    pub fn projection_of(&self, eye: Eye) -> BridgeResult<ProjectionMatrix> {
        self.info_of(eye).map(|info| info.projection)
    }

    pub fn pose_of(&self, eye: Eye) -> BridgeResult<Pose> {
        self.info_of(eye).map(|info| info.pose)
    }

    pub fn update_client(&mut self) {
        self.manager.update_client();
    }

    pub fn register_buffers(&mut self, buffers: &[RenderBuffer]) -> bool {
        self.manager.register_buffers(buffers)
    }

    /// Present one buffer per eye against the stored RenderInfo.
    pub fn present(&mut self, buffers: &[RenderBuffer], flip_y: bool) -> bool {
        let accepted = self.manager.present(buffers, &self.render_info, flip_y);
        if !accepted {
            log::warn!("PresentRenderBuffers() returned false, maybe because it was asked to quit");
        }
        accepted
    }
}

impl Drop for RenderManagerSession {
    fn drop(&mut self) {
        log::info!("Deleting RenderManager.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osvr_unity_renderer::mock::{sample_render_info, ManagerScript, ScriptedFactory};
    use stereo_api::NativeHandle;

    fn client() -> ClientContext {
        ClientContext::new(NativeHandle::from_raw(0xC1))
    }

    fn binding() -> DeviceBinding {
        DeviceBinding::Direct3D11 { device: NativeHandle::from_raw(1), context: NativeHandle::from_raw(2) }
    }

    #[test]
    fn not_okay_manager_fails_creation() {
        let factory = ScriptedFactory::with_script(ManagerScript { doing_okay: false, ..Default::default() });
        let err = RenderManagerSession::create(&factory, client(), &binding()).err().unwrap();
        assert!(matches!(err, BridgeError::CreationFailed(_)));
        assert_eq!(factory.log().lock().live(), 0);
    }

    #[test]
    fn display_failure_is_reported() {
        let factory = ScriptedFactory::with_script(ManagerScript { open_status: OpenStatus::Failure, ..Default::default() });
        let err = RenderManagerSession::create(&factory, client(), &binding()).err().unwrap();
        assert_eq!(err, BridgeError::DisplayOpenFailed);
    }

    #[test]
    fn creation_fetches_render_info_once() {
        let factory = ScriptedFactory::new();
        let session = RenderManagerSession::create(&factory, client(), &binding()).unwrap();
        assert_eq!(factory.log().lock().refreshes, 1);
        assert_eq!(session.viewport_of(Eye::Right).unwrap(), sample_render_info()[1].viewport);
        assert_eq!(session.client(), client());
    }

    #[test]
    fn empty_render_info_is_an_error() {
        let factory = ScriptedFactory::with_script(ManagerScript { infos: Vec::new(), ..Default::default() });
        let session = RenderManagerSession::create(&factory, client(), &binding()).unwrap();
        assert_eq!(session.pose_of(Eye::Left).unwrap_err(), BridgeError::NoRenderInfo);
    }

    #[test]
    fn single_eye_manager_rejects_right_eye() {
        let infos = vec![sample_render_info()[0]];
        let factory = ScriptedFactory::with_script(ManagerScript { infos, ..Default::default() });
        let session = RenderManagerSession::create(&factory, client(), &binding()).unwrap();
        assert!(session.projection_of(Eye::Left).is_ok());
        assert_eq!(session.projection_of(Eye::Right).unwrap_err(), BridgeError::EyeOutOfRange(1));
    }

    #[test]
    fn declined_present_returns_false() {
        let factory = ScriptedFactory::with_script(ManagerScript { present_accepts: false, ..Default::default() });
        let mut session = RenderManagerSession::create(&factory, client(), &binding()).unwrap();
        assert!(!session.present(&[], true));
        assert_eq!(factory.log().lock().presents.len(), 1);
    }

    #[test]
    fn dropping_session_drops_manager() {
        let factory = ScriptedFactory::new();
        let session = RenderManagerSession::create(&factory, client(), &binding()).unwrap();
        assert_eq!(factory.log().lock().live(), 1);
        drop(session);
        assert_eq!(factory.log().lock().live(), 0);
    }
}
