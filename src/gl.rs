//! OpenGL implementation of [`ShaderDevice`] on top of [glow].
//!
//! glow does not wrap the `GL_ARB_gl_spirv` entry points, so
//! `glShaderBinary`, `glSpecializeShader`, and `glValidateProgram` are loaded
//! through the same loader function used to create the glow context.
//!
//! [glow]: https://docs.rs/glow

use std::ffi::{c_void, CStr, CString};
use std::sync::Arc;

use glow::HasContext;

use crate::device::ShaderDevice;
use crate::error::{Result, ShaderError};
use crate::stage::ShaderStage;

/// `GL_SHADER_BINARY_FORMAT_SPIR_V` (GL 4.6 / `ARB_gl_spirv`).
const SHADER_BINARY_FORMAT_SPIR_V: u32 = 0x9551;

type ShaderBinaryFn = unsafe extern "system" fn(i32, *const u32, u32, *const c_void, i32);
type SpecializeShaderFn =
    unsafe extern "system" fn(u32, *const std::ffi::c_char, u32, *const u32, *const u32);
type ValidateProgramFn = unsafe extern "system" fn(u32);

/// [`ShaderDevice`] backed by a glow OpenGL context.
///
/// Cloning is cheap; clones share the context.
#[derive(Clone)]
pub struct GlowDevice {
    gl: Arc<glow::Context>,
    shader_binary: ShaderBinaryFn,
    specialize_shader: SpecializeShaderFn,
    validate_program: ValidateProgramFn,
}

/// Look up one GL entry point.
///
/// # Safety
///
/// `loader` must return either null or a pointer to the named function with
/// the signature `F`.
unsafe fn load_fn<F: Copy>(
    loader: &mut impl FnMut(&CStr) -> *const c_void,
    name: &CStr,
) -> Result<F> {
    let ptr = loader(name);
    if ptr.is_null() {
        return Err(ShaderError::ObjectCreationFailed(format!(
            "OpenGL entry point {} is not available",
            name.to_string_lossy()
        )));
    }
    // SAFETY: function pointers and data pointers have the same size on
    // every platform OpenGL runs on; the caller vouches for the signature.
    Ok(unsafe { std::mem::transmute_copy::<*const c_void, F>(&ptr) })
}

impl GlowDevice {
    /// Wrap a glow context.
    ///
    /// `loader` is the same function used to create `gl` (for example
    /// `glutin::display::Display::get_proc_address`).
    ///
    /// # Safety
    ///
    /// The context must be current, must support OpenGL 4.6 or
    /// `ARB_gl_spirv`, and must stay current on this thread for as long as
    /// the device (or any clone) is used.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::ObjectCreationFailed`] if a required entry
    /// point cannot be loaded.
    pub unsafe fn new(
        gl: Arc<glow::Context>,
        mut loader: impl FnMut(&CStr) -> *const c_void,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                gl,
                shader_binary: load_fn(&mut loader, c"glShaderBinary")?,
                specialize_shader: load_fn(&mut loader, c"glSpecializeShader")?,
                validate_program: load_fn(&mut loader, c"glValidateProgram")?,
            })
        }
    }

    /// The wrapped context.
    #[must_use]
    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }
}

fn gl_stage(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn entry_point_name(entry_point: &str) -> Result<CString> {
    CString::new(entry_point).map_err(|_| ShaderError::InvalidEntryPoint {
        entry_point: entry_point.to_string(),
    })
}

/// `glShaderBinary` takes the length as a `GLsizei`.
fn binary_len(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| ShaderError::BinaryTooLarge { len })
}

impl ShaderDevice for GlowDevice {
    type Shader = glow::Shader;
    type Program = glow::Program;

    fn create_program(&mut self) -> Result<glow::Program> {
        unsafe { self.gl.create_program() }.map_err(ShaderError::ObjectCreationFailed)
    }

    fn delete_program(&mut self, program: glow::Program) {
        unsafe { self.gl.delete_program(program) };
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Result<glow::Shader> {
        unsafe { self.gl.create_shader(gl_stage(stage)) }.map_err(ShaderError::ObjectCreationFailed)
    }

    fn delete_shader(&mut self, shader: glow::Shader) {
        unsafe { self.gl.delete_shader(shader) };
    }

    fn load_spirv(
        &mut self,
        shader: glow::Shader,
        binary: &[u32],
        entry_point: &str,
    ) -> Result<()> {
        let entry_point = entry_point_name(entry_point)?;
        let bytes: &[u8] = bytemuck::cast_slice(binary);
        let len = binary_len(bytes.len())?;
        let id = shader.0.get();

        unsafe {
            (self.shader_binary)(
                1,
                &id,
                SHADER_BINARY_FORMAT_SPIR_V,
                bytes.as_ptr().cast(),
                len,
            );
            (self.specialize_shader)(
                id,
                entry_point.as_ptr(),
                0,
                std::ptr::null(),
                std::ptr::null(),
            );
        }
        Ok(())
    }

    fn shader_compile_status(&self, shader: glow::Shader) -> bool {
        unsafe { self.gl.get_shader_compile_status(shader) }
    }

    fn shader_info_log(&self, shader: glow::Shader) -> String {
        unsafe { self.gl.get_shader_info_log(shader) }
    }

    fn attach_shader(&mut self, program: glow::Program, shader: glow::Shader) {
        unsafe { self.gl.attach_shader(program, shader) };
    }

    fn detach_shader(&mut self, program: glow::Program, shader: glow::Shader) {
        unsafe { self.gl.detach_shader(program, shader) };
    }

    fn link_program(&mut self, program: glow::Program) {
        unsafe { self.gl.link_program(program) };
    }

    fn validate_program(&mut self, program: glow::Program) {
        unsafe { (self.validate_program)(program.0.get()) };
    }

    fn program_link_status(&self, program: glow::Program) -> bool {
        unsafe { self.gl.get_program_link_status(program) }
    }

    fn program_info_log(&self, program: glow::Program) -> String {
        unsafe { self.gl.get_program_info_log(program) }
    }

    fn use_program(&mut self, program: Option<glow::Program>) {
        unsafe { self.gl.use_program(program) };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn entry_point_with_nul_is_rejected() {
        assert_eq!(entry_point_name("main").unwrap().as_bytes(), b"main");
        assert!(matches!(
            entry_point_name("ma\0in"),
            Err(ShaderError::InvalidEntryPoint { entry_point }) if entry_point == "ma\0in"
        ));
    }

    #[test]
    fn binary_length_must_fit_gl_sizei() {
        assert_eq!(binary_len(1024).unwrap(), 1024);
        let max = usize::try_from(i32::MAX).unwrap();
        assert_eq!(binary_len(max).unwrap(), i32::MAX);

        let too_long = max + 1;
        assert!(matches!(
            binary_len(too_long),
            Err(ShaderError::BinaryTooLarge { len }) if len == too_long
        ));
    }
}
