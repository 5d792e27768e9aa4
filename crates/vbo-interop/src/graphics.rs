//! Grafikseite: Oberflächen-Handles und der Vertex-Buffer.
//!
//! Das Fenstersystem ist Sache des Hosts; er implementiert [`GraphicsDevice`]
//! über seinem GL-Kontext.

use tracing::{debug, error, info};

use crate::{Float4, InteropError, Result};

/// GL-Buffer-Name; 0 ist der Null-Buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlBufferId(pub u32);

impl GlBufferId {
    pub const NULL: GlBufferId = GlBufferId(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Nutzungshinweis für `glBufferData`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    StreamDraw,
    StaticDraw,
    DynamicDraw,
}

/// Native Handles des aktuellen GL-Kontexts. Ohne sie kann der
/// Compute-Kontext keinen Speicher mit GL teilen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceHandles {
    Glx { context: usize, display: usize },
    Wgl { context: usize, hdc: usize },
    Egl { context: usize, display: usize },
    Cgl { share_group: usize },
}

/// Minimaler GL-Ausschnitt, den der Buffer-Provider und die Brücke brauchen.
pub trait GraphicsDevice {
    fn surface(&self) -> SurfaceHandles;

    /// `glGenBuffers(1, ..)`
    fn gen_buffer(&self) -> GlBufferId;

    /// `glBindBuffer(GL_ARRAY_BUFFER, ..)`; `None` löst die Bindung
    fn bind_array_buffer(&self, id: Option<GlBufferId>);

    /// `glBufferData` auf dem gebundenen Buffer, Inhalt undefiniert
    fn buffer_data(&self, bytes: usize, usage: BufferUsage);

    /// `glGetBufferParameteriv(.., GL_BUFFER_SIZE, ..)` des gebundenen Buffers
    fn buffer_size(&self) -> usize;

    /// `glGetError`; `None` entspricht `GL_NO_ERROR`
    fn take_error(&self) -> Option<u32>;

    /// `glFinish`
    fn finish(&self);

    /// `glDeleteBuffers(1, ..)`
    fn delete_buffer(&self, id: GlBufferId);
}

/// Obergrenze für `glBufferData`: `GL_BUFFER_SIZE` ist ein `GLint`.
pub const MAX_BUFFER_BYTES: usize = i32::MAX as usize;

/// Byte-Größe für `element_count` float4-Elemente, `None` bei Überlauf oder
/// jenseits von [`MAX_BUFFER_BYTES`].
pub fn buffer_bytes_for(element_count: usize) -> Option<usize> {
    element_count.checked_mul(Float4::BYTES).filter(|&bytes| bytes <= MAX_BUFFER_BYTES)
}

/// Vertex-Buffer mit `element_count` float4-Elementen.
#[derive(Debug)]
pub struct GraphicsBuffer {
    id: GlBufferId,
    element_count: usize,
    bytes: usize,
}

impl GraphicsBuffer {
    pub fn id(&self) -> GlBufferId {
        self.id
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub fn is_released(&self) -> bool {
        self.id.is_null()
    }
}

fn check<G: GraphicsDevice + ?Sized>(gl: &G, step: &'static str) -> Result<()> {
    match gl.take_error() {
        None => Ok(()),
        Some(code) => Err(InteropError::BufferCreation { step, code }),
    }
}

/// Legt den Vertex-Buffer an und prüft die tatsächlich allokierte Größe.
///
/// Jeder GL-Schritt wird auf einen Fehlerzustand geprüft. Schlägt etwas fehl,
/// wird der bereits erzeugte Name wieder freigegeben.
pub fn create_vertex_buffer<G: GraphicsDevice + ?Sized>(
    gl: &G,
    element_count: usize,
) -> Result<GraphicsBuffer> {
    let expected = buffer_bytes_for(element_count).ok_or_else(|| {
        InteropError::Config(format!("{element_count} elements exceed the maximum buffer size"))
    })?;
    let id = gl.gen_buffer();

    let result = (|| {
        gl.bind_array_buffer(Some(id));
        check(gl, "bind")?;
        gl.buffer_data(expected, BufferUsage::StreamDraw);
        check(gl, "allocate")?;

        let actual = gl.buffer_size();
        if actual != expected {
            return Err(InteropError::BufferSize { id: id.0, expected, actual });
        }

        gl.bind_array_buffer(None);
        check(gl, "unbind")
    })();

    match result {
        Ok(()) => {
            info!(id = id.0, bytes = expected, "vertex buffer created");
            Ok(GraphicsBuffer { id, element_count, bytes: expected })
        }
        Err(e) => {
            error!("{e}");
            gl.bind_array_buffer(None);
            gl.delete_buffer(id);
            Err(e)
        }
    }
}

/// Gibt den Buffer frei. Mehrfacher Aufruf ist ein No-op.
pub fn destroy_buffer<G: GraphicsDevice + ?Sized>(gl: &G, buffer: &mut GraphicsBuffer) {
    if buffer.id.is_null() {
        return;
    }
    debug!(id = buffer.id.0, "deleting vertex buffer");
    gl.bind_array_buffer(None);
    gl.delete_buffer(buffer.id);
    buffer.id = GlBufferId::NULL;
}
