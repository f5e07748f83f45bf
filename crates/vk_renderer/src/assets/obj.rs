//! OBJ file loader
//!
//! Reads positions, texture coordinates and faces. Every face corner
//! becomes its own vertex with a sequential index; no deduplication is
//! attempted even when the source repeats vertices (the index buffer
//! still works, just without the sharing win).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::assets::AssetError;
use crate::mesh::Vertex;

/// Decoded mesh data ready for GPU upload
pub struct ObjMesh {
    /// Expanded vertex array, one entry per face corner
    pub vertices: Vec<Vertex>,
    /// Sequential 32-bit indices (0, 1, 2, ...)
    pub indices: Vec<u32>,
}

/// Load a mesh from an OBJ file on disk
pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<ObjMesh, AssetError> {
    let file = File::open(path.as_ref())?;
    let mesh = read_obj(BufReader::new(file))?;
    log::info!(
        "Loaded model {:?}: {} vertices, {} indices",
        path.as_ref(),
        mesh.vertices.len(),
        mesh.indices.len()
    );
    Ok(mesh)
}

/// Parse OBJ data from any buffered reader
pub fn read_obj<R: BufRead>(reader: R) -> Result<ObjMesh, AssetError> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut tex_coords: Vec<[f32; 2]> = Vec::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut missing_uvs = 0usize;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "v" => {
                if parts.len() < 4 {
                    return Err(AssetError::ParseError(format!("malformed vertex line: {}", line)));
                }
                let x = parse_float(parts[1], "vertex x")?;
                let y = parse_float(parts[2], "vertex y")?;
                let z = parse_float(parts[3], "vertex z")?;
                positions.push([x, y, z]);
            }
            "vt" => {
                if parts.len() < 3 {
                    return Err(AssetError::ParseError(format!("malformed tex coord line: {}", line)));
                }
                let u = parse_float(parts[1], "tex coord u")?;
                let v = parse_float(parts[2], "tex coord v")?;
                tex_coords.push([u, v]);
            }
            "f" => {
                if parts.len() < 4 {
                    return Err(AssetError::ParseError(format!("face with fewer than 3 corners: {}", line)));
                }

                // Fan-triangulate: corners (0, i, i+1) for each extra corner
                let corners = &parts[1..];
                for i in 1..corners.len() - 1 {
                    for &corner in &[corners[0], corners[i], corners[i + 1]] {
                        let (position, tex_coord) =
                            resolve_corner(corner, &positions, &tex_coords, &mut missing_uvs)?;

                        vertices.push(Vertex {
                            position,
                            colour: [1.0, 1.0, 1.0],
                            tex_coord,
                        });
                        indices.push(indices.len() as u32);
                    }
                }
            }
            // Normals, materials, groups and the rest are not used
            _ => {}
        }
    }

    if missing_uvs > 0 {
        log::warn!(
            "Model contains {} face corners without UV coordinates; fallback [0, 1] used",
            missing_uvs
        );
    }

    Ok(ObjMesh { vertices, indices })
}

fn parse_float(text: &str, what: &str) -> Result<f32, AssetError> {
    text.parse()
        .map_err(|_| AssetError::ParseError(format!("invalid {}: {}", what, text)))
}

fn resolve_corner(
    corner: &str,
    positions: &[[f32; 3]],
    tex_coords: &[[f32; 2]],
    missing_uvs: &mut usize,
) -> Result<([f32; 3], [f32; 2]), AssetError> {
    let mut iter = corner.split('/');

    let position_index: usize = iter
        .next()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| AssetError::ParseError(format!("invalid position index: {}", corner)))?;
    let position = *positions
        .get(position_index - 1)
        .ok_or_else(|| AssetError::ParseError(format!("position index out of range: {}", corner)))?;

    // Second slot is the texture coordinate index; it may be absent
    let tex_coord = match iter.next().filter(|s| !s.is_empty()) {
        Some(text) => {
            let index: usize = text
                .parse()
                .map_err(|_| AssetError::ParseError(format!("invalid tex coord index: {}", corner)))?;
            let [u, v] = *tex_coords
                .get(index - 1)
                .ok_or_else(|| AssetError::ParseError(format!("tex coord index out of range: {}", corner)))?;
            // OBJ puts v = 0 at the bottom, Vulkan samples top-down
            [u, 1.0 - v]
        }
        None => {
            *missing_uvs += 1;
            [0.0, 1.0]
        }
    };

    Ok((position, tex_coord))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    const TRIANGLE: &str = "\
# simple triangle
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 0.0 1.0
f 1/1 2/2 3/3
";

    #[test]
    fn test_read_obj_triangle() {
        let mesh = read_obj(Cursor::new(TRIANGLE)).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
        // Every loaded vertex is white
        assert_eq!(mesh.vertices[0].colour, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_read_obj_flips_v_coordinate() {
        let mesh = read_obj(Cursor::new(TRIANGLE)).unwrap();
        assert_relative_eq!(mesh.vertices[0].tex_coord[1], 1.0);
        assert_relative_eq!(mesh.vertices[2].tex_coord[1], 0.0);
    }

    #[test]
    fn test_read_obj_no_deduplication() {
        // Two faces sharing vertices still expand to six entries
        let data = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
v 1.0 1.0 0.0
vt 0.0 0.0
f 1/1 2/1 3/1
f 2/1 4/1 3/1
";
        let mesh = read_obj(Cursor::new(data)).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_read_obj_quad_fan_triangulation() {
        let data = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
f 1/1 2/1 3/1 4/1
";
        let mesh = read_obj(Cursor::new(data)).unwrap();
        // One quad becomes two triangles
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.vertices[0].position, mesh.vertices[3].position);
    }

    #[test]
    fn test_read_obj_missing_uv_fallback() {
        let data = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
f 1 2 3
";
        let mesh = read_obj(Cursor::new(data)).unwrap();
        for vertex in &mesh.vertices {
            assert_eq!(vertex.tex_coord, [0.0, 1.0]);
        }
    }

    #[test]
    fn test_read_obj_rejects_bad_index() {
        let data = "\
v 0.0 0.0 0.0
f 1 2 9
";
        assert!(read_obj(Cursor::new(data)).is_err());
    }

    #[test]
    fn test_read_obj_skips_comments_and_unknown_keywords() {
        let data = "\
# header comment
o object_name
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vn 0.0 0.0 1.0
s off
f 1 2 3
";
        let mesh = read_obj(Cursor::new(data)).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
    }
}
