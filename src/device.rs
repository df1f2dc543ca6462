//! GPU device capability and program composition.
//!
//! [`ShaderDevice`] is the narrow slice of a graphics API the pipeline needs:
//! create and delete shader and program objects, load SPIR-V, link, and
//! bind. [`GlowDevice`](crate::GlowDevice) implements it for OpenGL; tests
//! implement it with counting stubs.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::{Result, ShaderError};
use crate::stage::ShaderStage;

/// Driver operations used to turn SPIR-V binaries into a program.
pub trait ShaderDevice {
    /// Handle of a per-stage shader object.
    type Shader: Copy + Debug;
    /// Handle of a linked program object.
    type Program: Copy + Debug + PartialEq;

    /// Create an empty program object.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::ObjectCreationFailed`] if the driver refuses.
    fn create_program(&mut self) -> Result<Self::Program>;

    /// Delete a program object.
    fn delete_program(&mut self, program: Self::Program);

    /// Create a shader object for `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::ObjectCreationFailed`] if the driver refuses.
    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader>;

    /// Delete a shader object.
    fn delete_shader(&mut self, shader: Self::Shader);

    /// Upload a SPIR-V binary into `shader` and specialise it at
    /// `entry_point`. The driver's verdict is read back through
    /// [`shader_compile_status`](Self::shader_compile_status).
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::InvalidEntryPoint`] or
    /// [`ShaderError::BinaryTooLarge`] if the arguments cannot be passed to
    /// the driver at all; nothing is uploaded in that case.
    fn load_spirv(&mut self, shader: Self::Shader, binary: &[u32], entry_point: &str)
        -> Result<()>;

    /// Whether the shader specialised successfully.
    fn shader_compile_status(&self, shader: Self::Shader) -> bool;

    /// The shader's info log.
    fn shader_info_log(&self, shader: Self::Shader) -> String;

    /// Attach a shader to a program.
    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader);

    /// Detach a shader from a program.
    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader);

    /// Link a program from its attached shaders.
    fn link_program(&mut self, program: Self::Program);

    /// Validate a linked program against the current state.
    fn validate_program(&mut self, program: Self::Program);

    /// Whether the last link succeeded.
    fn program_link_status(&self, program: Self::Program) -> bool;

    /// The program's info log.
    fn program_info_log(&self, program: Self::Program) -> String;

    /// Make `program` current, or unbind with `None`.
    fn use_program(&mut self, program: Option<Self::Program>);
}

/// Build one linked program from per-stage native binaries.
///
/// Shader objects created here never outlive the call: on success they are
/// detached and deleted after linking, and on any failure every shader
/// created so far (and the program) is deleted before the error is returned.
///
/// # Errors
///
/// Returns [`ShaderError::StageLinkFailed`] if a stage does not load,
/// [`ShaderError::ProgramLinkFailed`] if linking fails,
/// [`ShaderError::ObjectCreationFailed`] if the device cannot create objects,
/// and whatever [`ShaderDevice::load_spirv`] rejects.
pub fn compose_program<D: ShaderDevice>(
    device: &mut D,
    binaries: &BTreeMap<ShaderStage, Vec<u32>>,
    entry_point: &str,
) -> Result<D::Program> {
    let program = device.create_program()?;
    let mut shaders = Vec::with_capacity(binaries.len());

    let release = |device: &mut D, shaders: &[D::Shader]| {
        for &shader in shaders {
            device.delete_shader(shader);
        }
        device.delete_program(program);
    };

    for (&stage, binary) in binaries {
        let shader = match device.create_shader(stage) {
            Ok(shader) => shader,
            Err(err) => {
                release(device, &shaders);
                return Err(err);
            }
        };
        shaders.push(shader);

        if let Err(err) = device.load_spirv(shader, binary, entry_point) {
            log::error!("{stage} shader upload failed: {err}");
            release(device, &shaders);
            return Err(err);
        }

        if !device.shader_compile_status(shader) {
            let log = device.shader_info_log(shader);
            log::error!("{stage} shader injection failed: {log}");
            release(device, &shaders);
            return Err(ShaderError::StageLinkFailed { stage, log });
        }

        device.attach_shader(program, shader);
    }

    device.link_program(program);

    if !device.program_link_status(program) {
        let log = device.program_info_log(program);
        log::error!("Program link failed: {log}");
        release(device, &shaders);
        return Err(ShaderError::ProgramLinkFailed { log });
    }

    device.validate_program(program);

    for &shader in &shaders {
        device.detach_shader(program, shader);
        device.delete_shader(shader);
    }

    Ok(program)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Every call a [`RecordingDevice`] has seen.
    #[derive(Default)]
    pub(crate) struct DeviceLog {
        pub next_id: u32,
        pub created_shaders: Vec<(u32, ShaderStage)>,
        pub deleted_shaders: Vec<u32>,
        pub created_programs: Vec<u32>,
        pub deleted_programs: Vec<u32>,
        pub attached: Vec<(u32, u32)>,
        pub uploaded: Vec<(ShaderStage, Vec<u32>, String)>,
        pub bound: Vec<Option<u32>>,
    }

    impl DeviceLog {
        fn stage_of(&self, shader: u32) -> ShaderStage {
            self.created_shaders
                .iter()
                .find(|(id, _)| *id == shader)
                .map(|(_, stage)| *stage)
                .unwrap()
        }

        pub(crate) fn live_shaders(&self) -> usize {
            self.created_shaders.len() - self.deleted_shaders.len()
        }
    }

    /// Stub device that records calls into a shared [`DeviceLog`].
    #[derive(Default, Clone)]
    pub(crate) struct RecordingDevice {
        pub fail_stage: Option<ShaderStage>,
        pub fail_link: bool,
        pub log: Rc<RefCell<DeviceLog>>,
    }

    impl ShaderDevice for RecordingDevice {
        type Shader = u32;
        type Program = u32;

        fn create_program(&mut self) -> Result<u32> {
            let mut log = self.log.borrow_mut();
            log.next_id += 1;
            let id = log.next_id;
            log.created_programs.push(id);
            Ok(id)
        }

        fn delete_program(&mut self, program: u32) {
            self.log.borrow_mut().deleted_programs.push(program);
        }

        fn create_shader(&mut self, stage: ShaderStage) -> Result<u32> {
            let mut log = self.log.borrow_mut();
            log.next_id += 1;
            let id = log.next_id;
            log.created_shaders.push((id, stage));
            Ok(id)
        }

        fn delete_shader(&mut self, shader: u32) {
            self.log.borrow_mut().deleted_shaders.push(shader);
        }

        fn load_spirv(&mut self, shader: u32, binary: &[u32], entry_point: &str) -> Result<()> {
            if entry_point.contains('\0') {
                return Err(ShaderError::InvalidEntryPoint {
                    entry_point: entry_point.to_string(),
                });
            }
            let mut log = self.log.borrow_mut();
            let stage = log.stage_of(shader);
            log.uploaded
                .push((stage, binary.to_vec(), entry_point.to_string()));
            Ok(())
        }

        fn shader_compile_status(&self, shader: u32) -> bool {
            self.fail_stage != Some(self.log.borrow().stage_of(shader))
        }

        fn shader_info_log(&self, shader: u32) -> String {
            format!("bad {} binary", self.log.borrow().stage_of(shader))
        }

        fn attach_shader(&mut self, program: u32, shader: u32) {
            self.log.borrow_mut().attached.push((program, shader));
        }

        fn detach_shader(&mut self, _program: u32, _shader: u32) {}

        fn link_program(&mut self, _program: u32) {}

        fn validate_program(&mut self, _program: u32) {}

        fn program_link_status(&self, _program: u32) -> bool {
            !self.fail_link
        }

        fn program_info_log(&self, _program: u32) -> String {
            "unresolved varying".to_string()
        }

        fn use_program(&mut self, program: Option<u32>) {
            self.log.borrow_mut().bound.push(program);
        }
    }

    fn binaries() -> BTreeMap<ShaderStage, Vec<u32>> {
        BTreeMap::from([
            (ShaderStage::Fragment, vec![2, 2]),
            (ShaderStage::Vertex, vec![1, 1]),
        ])
    }

    #[test]
    fn composes_and_releases_stage_objects() {
        let mut device = RecordingDevice::default();
        let program = compose_program(&mut device, &binaries(), "main").unwrap();

        let log = device.log.borrow();
        assert_eq!(log.created_shaders.len(), 2);
        assert_eq!(log.live_shaders(), 0);
        assert!(log.deleted_programs.is_empty());
        assert!(log.attached.iter().all(|(p, _)| *p == program));
        // Vertex first, regardless of map construction order.
        assert_eq!(log.uploaded[0].0, ShaderStage::Vertex);
        assert_eq!(log.uploaded[0].1, vec![1, 1]);
        assert_eq!(log.uploaded[1].1, vec![2, 2]);
        assert_eq!(log.uploaded[0].2, "main");
    }

    #[test]
    fn stage_failure_deletes_every_created_shader() {
        let mut device = RecordingDevice {
            fail_stage: Some(ShaderStage::Fragment),
            ..Default::default()
        };
        let err = compose_program(&mut device, &binaries(), "main").unwrap_err();

        match err {
            ShaderError::StageLinkFailed { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert_eq!(log, "bad fragment binary");
            }
            other => panic!("unexpected error: {other}"),
        }
        let log = device.log.borrow();
        assert_eq!(log.created_shaders.len(), 2);
        assert_eq!(log.deleted_shaders.len(), 2);
        assert_eq!(log.deleted_programs.len(), 1);
    }

    #[test]
    fn first_stage_failure_deletes_one_shader() {
        let mut device = RecordingDevice {
            fail_stage: Some(ShaderStage::Vertex),
            ..Default::default()
        };
        compose_program(&mut device, &binaries(), "main").unwrap_err();

        let log = device.log.borrow();
        assert_eq!(log.created_shaders.len(), 1);
        assert_eq!(log.deleted_shaders.len(), 1);
    }

    #[test]
    fn link_failure_releases_everything() {
        let mut device = RecordingDevice {
            fail_link: true,
            ..Default::default()
        };
        let err = compose_program(&mut device, &binaries(), "main").unwrap_err();

        assert!(matches!(err, ShaderError::ProgramLinkFailed { .. }));
        let log = device.log.borrow();
        assert_eq!(log.live_shaders(), 0);
        assert_eq!(log.deleted_programs.len(), 1);
    }

    #[test]
    fn rejected_upload_releases_everything() {
        let mut device = RecordingDevice::default();
        let err = compose_program(&mut device, &binaries(), "ma\0in").unwrap_err();

        assert!(matches!(err, ShaderError::InvalidEntryPoint { .. }));
        let log = device.log.borrow();
        assert!(log.uploaded.is_empty());
        assert_eq!(log.created_shaders.len(), 1);
        assert_eq!(log.live_shaders(), 0);
        assert_eq!(log.deleted_programs, log.created_programs);
    }
}
