//! `.ema` / `.emo` (binary) codec.
//!
//! The codec is IO-free: it operates on in-memory byte slices and produces complete buffers.
//! Only the animation region is regenerated on encode; the skeleton block is carried through
//! byte for byte.

use crate::format::{CONTAINER_VERSION, EMA_MAGIC, EMO_MAGIC, ENDIAN_MARKER, HEADER_SIZE};
use crate::{
    Animation, AnimationContainer, BindPose, CmdTrack, ContainerHeader, Error, IkEntry, Node,
    Skeleton, TRACK_WIDE_INDICES, TRACK_WIDE_STEPS, TransformType,
};
use byteorder::{ByteOrder, LittleEndian};
use glam::Mat4;

const NO_PARENT: u16 = 0xFFFF;

const SKELETON_HEADER_SIZE: usize = 0x20;
const NODE_RECORD_SIZE: usize = 0x90;
const IK_ENTRY_HEADER_SIZE: usize = 0x08;
const ANIMATION_HEADER_SIZE: usize = 0x14;
const TRACK_HEADER_SIZE: usize = 0x08;

const NARROW_TANGENT_FLAG: u32 = 0x4000;
const NARROW_INDEX_MASK: u32 = 0x3FFF;
const WIDE_TANGENT_FLAG: u32 = 0x4000_0000;
const WIDE_INDEX_MASK: u32 = 0x3FFF_FFFF;

#[derive(Clone, Debug)]
struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn at(bytes: &'a [u8], offset: usize) -> Result<Self, Error> {
        if offset > bytes.len() {
            return Err(Error::format(
                offset,
                format!("offset past end of buffer (len={})", bytes.len()),
            ));
        }
        Ok(Self {
            bytes,
            cursor: offset,
        })
    }

    fn offset(&self) -> usize {
        self.cursor
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::format(
                self.cursor,
                format!("unexpected EOF (need {len} bytes, {} left)", self.remaining()),
            ));
        }
        let out = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(out)
    }

    /// Fails unless `count` records of `size` bytes remain, so file counts never size an
    /// allocation on their own.
    fn ensure_items(&self, count: usize, size: usize, what: &str) -> Result<(), Error> {
        let needed = count.checked_mul(size);
        if needed.is_none_or(|needed| needed > self.remaining()) {
            return Err(Error::format(
                self.cursor,
                format!("{what}: {count} entries do not fit in {} remaining bytes", self.remaining()),
            ));
        }
        Ok(())
    }

    fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.take(len).map(|_| ())
    }

    fn align4(&mut self) -> Result<(), Error> {
        let pad = (4 - self.cursor % 4) % 4;
        self.skip(pad)
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    fn read_matrix(&mut self) -> Result<Mat4, Error> {
        let mut m = [0.0f32; 16];
        LittleEndian::read_f32_into(self.take(64)?, &mut m);
        // Stored row-vector style (translation in 12..15): read rows as glam columns.
        Ok(Mat4::from_cols_array(&m))
    }

    fn read_cstring(&mut self) -> Result<String, Error> {
        let start = self.cursor;
        let rest = &self.bytes[start.min(self.bytes.len())..];
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            Error::format(start, "unterminated string")
        })?;
        let s = std::str::from_utf8(&rest[..len])
            .map_err(|e| Error::format(start, format!("invalid utf-8 in string: {e}")))?;
        self.cursor = start + len + 1;
        Ok(s.to_string())
    }
}

fn block_offset(base: usize, relative: u32, len: usize, what: &str) -> Result<usize, Error> {
    let offset = base
        .checked_add(relative as usize)
        .ok_or_else(|| Error::format(base, format!("{what} offset overflows")))?;
    if offset > len {
        return Err(Error::format(
            base,
            format!("{what} offset {offset:#x} past end of buffer (len={len:#x})"),
        ));
    }
    Ok(offset)
}

struct RawHeader {
    header: ContainerHeader,
    skeleton_offset: u32,
    animation_count: usize,
}

fn read_header(input: &mut BinaryInput<'_>, magic: [u8; 4]) -> Result<RawHeader, Error> {
    let found = input.take(4)?;
    if found != magic {
        return Err(Error::format(
            0,
            format!(
                "bad magic {:?}, expected {:?}",
                String::from_utf8_lossy(found),
                String::from_utf8_lossy(&magic)
            ),
        ));
    }
    let endian = input.read_u16()?;
    if endian != ENDIAN_MARKER {
        return Err(Error::format(4, format!("unsupported endian marker {endian:#06x}")));
    }
    let header_size = input.read_u16()?;
    if header_size != HEADER_SIZE {
        return Err(Error::format(6, format!("unsupported header size {header_size:#x}")));
    }
    let version = input.read_u16()?;
    if version != CONTAINER_VERSION {
        return Err(Error::format(8, format!("unsupported container version {version}")));
    }
    let kind = input.read_u16()?;
    let skeleton_offset = input.read_u32()?;
    let animation_count = input.read_u16()? as usize;
    let reserved_word = input.read_u16()?;
    let mut reserved = [0u8; 12];
    reserved.copy_from_slice(input.take(12)?);
    Ok(RawHeader {
        header: ContainerHeader {
            version,
            kind,
            reserved_word,
            reserved,
        },
        skeleton_offset,
        animation_count,
    })
}

struct DecodedSkeleton {
    nodes: Vec<Node>,
    ik_entries: Vec<IkEntry>,
    bind_matrices: Option<Vec<Mat4>>,
}

fn read_skeleton(bytes: &[u8], base: usize) -> Result<DecodedSkeleton, Error> {
    let mut input = BinaryInput::at(bytes, base)?;
    let node_count = input.read_u16()? as usize;
    let ik_count = input.read_u16()? as usize;
    let _ = input.read_u32()?;
    let node_table = input.read_u32()?;
    let name_table = input.read_u32()?;
    let ik_table = input.read_u32()?;
    let bind_table = input.read_u32()?;

    let node_table = block_offset(base, node_table, bytes.len(), "node table")?;
    let name_table = block_offset(base, name_table, bytes.len(), "name table")?;

    let mut input = BinaryInput::at(bytes, name_table)?;
    input.ensure_items(node_count, 4, "name table")?;
    let mut names = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let name_offset = block_offset(base, input.read_u32()?, bytes.len(), "node name")?;
        names.push(BinaryInput::at(bytes, name_offset)?.read_cstring()?);
    }

    let mut input = BinaryInput::at(bytes, node_table)?;
    input.ensure_items(node_count, NODE_RECORD_SIZE, "node table")?;
    let mut nodes = Vec::with_capacity(node_count);
    for (id, name) in names.into_iter().enumerate() {
        let record = input.offset();
        let parent = input.read_u16()?;
        let _child = input.read_u16()?;
        let _sibling = input.read_u16()?;
        let _ = input.read_u16()?;
        let bit_flag = input.read_u16()?;
        let _ = input.read_u16()?;
        let _ = input.read_u32()?;
        let matrix = input.read_matrix()?;
        let pre_matrix = input.read_matrix()?;

        let parent = if parent == NO_PARENT {
            None
        } else if (parent as usize) < node_count && parent as usize != id {
            Some(parent as usize)
        } else {
            return Err(Error::format(
                record,
                format!("node '{name}' has invalid parent {parent} (node count {node_count})"),
            ));
        };

        let mut node = Node::new(id, name, parent, matrix);
        node.bit_flag = bit_flag;
        node.pre_matrix = pre_matrix;
        nodes.push(node);
    }

    let mut ik_entries = Vec::new();
    if ik_count > 0 {
        let ik_table = block_offset(base, ik_table, bytes.len(), "IK table")?;
        let mut input = BinaryInput::at(bytes, ik_table)?;
        input.ensure_items(ik_count, IK_ENTRY_HEADER_SIZE, "IK table")?;
        ik_entries.reserve(ik_count);
        for _ in 0..ik_count {
            let entry_start = input.offset();
            let method = input.read_u8()?;
            let solver_flags = input.read_u8()?;
            let variant_flags = input.read_u8()?;
            let id_count = input.read_u8()? as usize;
            let entry_size = input.read_u16()? as usize;
            let float_count = input.read_u16()? as usize;
            input.ensure_items(id_count, 2, "IK node ids")?;
            let mut node_ids = Vec::with_capacity(id_count);
            for _ in 0..id_count {
                let id_offset = input.offset();
                let id = input.read_u16()?;
                if id as usize >= node_count {
                    return Err(Error::format(
                        id_offset,
                        format!("IK entry references node {id} (node count {node_count})"),
                    ));
                }
                node_ids.push(id);
            }
            input.align4()?;
            input.ensure_items(float_count, 4, "IK floats")?;
            let mut floats = Vec::with_capacity(float_count);
            for _ in 0..float_count {
                floats.push(input.read_f32()?);
            }
            let consumed = input.offset() - entry_start;
            if entry_size < consumed {
                return Err(Error::format(
                    entry_start,
                    format!("IK entry size {entry_size} smaller than its contents ({consumed})"),
                ));
            }
            input.skip(entry_size - consumed)?;
            ik_entries.push(IkEntry {
                method,
                solver_flags,
                variant_flags,
                node_ids,
                floats,
            });
        }
    }

    let bind_matrices = if bind_table != 0 {
        let bind_table = block_offset(base, bind_table, bytes.len(), "bind matrix table")?;
        let mut input = BinaryInput::at(bytes, bind_table)?;
        input.ensure_items(node_count, 64, "bind matrix table")?;
        let mut out = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            out.push(input.read_matrix()?);
        }
        Some(out)
    } else {
        None
    };

    Ok(DecodedSkeleton {
        nodes,
        ik_entries,
        bind_matrices,
    })
}

/// Decodes one animation block starting at `base`.
pub fn decode_animation(bytes: &[u8], base: usize) -> Result<Animation, Error> {
    let mut input = BinaryInput::at(bytes, base)?;
    let duration = input.read_u16()?;
    let track_count = input.read_u16()? as usize;
    let value_count = input.read_u32()? as usize;
    let reserved = input.read_u32()?;
    let name_offset = input.read_u32()?;
    let value_table = input.read_u32()?;
    input.ensure_items(track_count, 4, "track offset table")?;
    let mut track_offsets = Vec::with_capacity(track_count);
    for _ in 0..track_count {
        track_offsets.push(input.read_u32()?);
    }

    let name = if name_offset != 0 {
        let at = block_offset(base, name_offset, bytes.len(), "animation name")?;
        BinaryInput::at(bytes, at)?.read_cstring()?
    } else {
        String::new()
    };

    let mut values = Vec::new();
    if value_count > 0 {
        let at = block_offset(base, value_table, bytes.len(), "value table")?;
        let mut input = BinaryInput::at(bytes, at)?;
        input.ensure_items(value_count, 4, "value table")?;
        values.reserve_exact(value_count);
        for _ in 0..value_count {
            values.push(input.read_f32()?);
        }
    }

    let mut tracks = Vec::with_capacity(track_count);
    for relative in track_offsets {
        let at = block_offset(base, relative, bytes.len(), "track")?;
        tracks.push(read_track(bytes, at, value_count)?);
    }

    Ok(Animation {
        name,
        duration,
        tracks,
        values,
        reserved,
    })
}

fn read_track(bytes: &[u8], base: usize, value_count: usize) -> Result<CmdTrack, Error> {
    let mut input = BinaryInput::at(bytes, base)?;
    let bone_id = input.read_u16()?;
    let type_offset = input.offset();
    let transform_type = TransformType::from_u8(input.read_u8()?)
        .ok_or_else(|| Error::format(type_offset, "transform type out of range"))?;
    let bit_flag = input.read_u8()?;
    let step_count = input.read_u16()? as usize;
    let index_table = input.read_u16()?;

    let wide_steps = (bit_flag & TRACK_WIDE_STEPS) != 0;
    input.ensure_items(step_count, if wide_steps { 2 } else { 1 }, "track steps")?;
    let mut steps = Vec::with_capacity(step_count);
    for _ in 0..step_count {
        let step_offset = input.offset();
        let step = if wide_steps {
            input.read_u16()?
        } else {
            input.read_u8()? as u16
        };
        if steps.last().is_some_and(|&prev| step <= prev) {
            return Err(Error::format(step_offset, "track steps are not strictly increasing"));
        }
        steps.push(step);
    }

    let at = block_offset(base, index_table as u32, bytes.len(), "index table")?;
    let mut input = BinaryInput::at(bytes, at)?;
    let wide = (bit_flag & TRACK_WIDE_INDICES) != 0;
    input.ensure_items(step_count, if wide { 4 } else { 2 }, "track indices")?;
    let mut value_indices = Vec::with_capacity(step_count);
    let mut tangent_indices = Vec::with_capacity(step_count);
    for _ in 0..step_count {
        let index_offset = input.offset();
        let (raw, tangent_flag, mask) = if wide {
            (input.read_u32()?, WIDE_TANGENT_FLAG, WIDE_INDEX_MASK)
        } else {
            (input.read_u16()? as u32, NARROW_TANGENT_FLAG, NARROW_INDEX_MASK)
        };
        let value = raw & mask;
        let tangent = ((raw & tangent_flag) != 0).then_some(value + 1);
        let last_slot = tangent.unwrap_or(value) as usize;
        if last_slot >= value_count {
            return Err(Error::format(
                index_offset,
                format!("value pool index {last_slot} out of range (value count {value_count})"),
            ));
        }
        value_indices.push(value);
        tangent_indices.push(tangent);
    }

    Ok(CmdTrack {
        bone_id,
        transform_type,
        bit_flag,
        steps,
        value_indices,
        tangent_indices,
    })
}

impl AnimationContainer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = BinaryInput::new(bytes);
        let raw = read_header(&mut input, EMA_MAGIC)?;

        input.ensure_items(raw.animation_count, 4, "animation offset table")?;
        let mut animation_offsets = Vec::with_capacity(raw.animation_count);
        for _ in 0..raw.animation_count {
            let at = input.offset();
            let offset = input.read_u32()? as usize;
            if offset >= bytes.len() {
                return Err(Error::format(at, format!("animation offset {offset:#x} past end")));
            }
            animation_offsets.push(offset);
        }

        if raw.skeleton_offset == 0 {
            return Err(Error::MissingSkeleton);
        }
        let skeleton_start = raw.skeleton_offset as usize;
        let decoded = read_skeleton(bytes, skeleton_start)?;
        let skeleton = Skeleton::new(decoded.nodes, decoded.ik_entries).map_err(|e| match e {
            Error::InvalidValue { message } => Error::format(skeleton_start, message),
            other => other,
        })?;

        // The skeleton block runs up to the next animation (or the end of the buffer).
        let skeleton_end = animation_offsets
            .iter()
            .copied()
            .filter(|&o| o > skeleton_start)
            .min()
            .unwrap_or(bytes.len());
        let skeleton_block = bytes[skeleton_start..skeleton_end].to_vec();

        let mut animations = Vec::with_capacity(animation_offsets.len());
        for offset in animation_offsets {
            animations.push(decode_animation(bytes, offset)?);
        }

        Ok(Self {
            skeleton,
            animations,
            header: raw.header,
            skeleton_block,
        })
    }

    /// Builds a container around a freshly encoded skeleton block.
    pub fn from_parts(skeleton: Skeleton, animations: Vec<Animation>) -> Result<Self, Error> {
        let skeleton_block = encode_skeleton(&skeleton, false)?;
        Ok(Self {
            skeleton,
            animations,
            header: ContainerHeader {
                version: CONTAINER_VERSION,
                kind: 3,
                ..ContainerHeader::default()
            },
            skeleton_block,
        })
    }

    /// Encodes the whole container into one buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let animation_count = u16::try_from(self.animations.len())
            .map_err(|_| Error::encode("too many animations"))?;
        let mut out = Vec::new();
        write_header(&mut out, EMA_MAGIC, &self.header, animation_count);
        let table = out.len();
        out.resize(table + self.animations.len() * 4, 0);
        pad4(&mut out);

        let skeleton_offset = out.len();
        out.extend_from_slice(&self.skeleton_block);
        LittleEndian::write_u32(&mut out[0x0C..0x10], skeleton_offset as u32);

        for (i, animation) in self.animations.iter().enumerate() {
            pad4(&mut out);
            let offset = out.len();
            out.extend_from_slice(&encode_animation(animation)?);
            LittleEndian::write_u32(&mut out[table + i * 4..table + i * 4 + 4], offset as u32);
        }
        Ok(out)
    }
}

impl BindPose {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = BinaryInput::new(bytes);
        let raw = read_header(&mut input, EMO_MAGIC)?;
        if raw.skeleton_offset == 0 {
            return Err(Error::MissingSkeleton);
        }
        let skeleton_start = raw.skeleton_offset as usize;
        let decoded = read_skeleton(bytes, skeleton_start)?;
        let matrices = decoded.bind_matrices.ok_or_else(|| {
            Error::format(skeleton_start + 0x14, "bind-pose container has no bind matrix table")
        })?;
        Ok(Self {
            nodes: decoded
                .nodes
                .into_iter()
                .zip(matrices)
                .map(|(node, matrix)| (node.name, matrix))
                .collect(),
        })
    }

    /// Encodes a minimal bind-pose container (flat node list, no hierarchy).
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(id, (name, matrix))| {
                let mut node = Node::new(id, name.clone(), None, Mat4::IDENTITY);
                node.sbp_matrix = Some(*matrix);
                node
            })
            .collect::<Vec<_>>();
        let header = ContainerHeader {
            version: CONTAINER_VERSION,
            ..ContainerHeader::default()
        };
        let mut out = Vec::new();
        write_header(&mut out, EMO_MAGIC, &header, 0);
        let skeleton_offset = out.len();
        out.extend_from_slice(&encode_nodes(&nodes, &[], true)?);
        LittleEndian::write_u32(&mut out[0x0C..0x10], skeleton_offset as u32);
        Ok(out)
    }
}

fn write_header(out: &mut Vec<u8>, magic: [u8; 4], header: &ContainerHeader, animations: u16) {
    out.extend_from_slice(&magic);
    out.extend_from_slice(&ENDIAN_MARKER.to_le_bytes());
    out.extend_from_slice(&HEADER_SIZE.to_le_bytes());
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.kind.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&animations.to_le_bytes());
    out.extend_from_slice(&header.reserved_word.to_le_bytes());
    out.extend_from_slice(&header.reserved);
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn write_matrix(out: &mut Vec<u8>, m: &Mat4) {
    for v in m.to_cols_array() {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Encodes a skeleton block (node table, names, IK table and optionally bind matrices).
pub fn encode_skeleton(skeleton: &Skeleton, with_bind_matrices: bool) -> Result<Vec<u8>, Error> {
    encode_nodes(&skeleton.nodes, &skeleton.ik_entries, with_bind_matrices)
}

fn encode_nodes(
    nodes: &[Node],
    ik_entries: &[IkEntry],
    with_bind_matrices: bool,
) -> Result<Vec<u8>, Error> {
    // Ids stay below the node count, so a count that fits in u16 keeps every id clear of
    // NO_PARENT.
    let node_count = u16::try_from(nodes.len())
        .ok()
        .filter(|&count| count != NO_PARENT)
        .ok_or_else(|| Error::encode(format!("too many nodes ({})", nodes.len())))?;
    let ik_count = u16::try_from(ik_entries.len())
        .map_err(|_| Error::encode(format!("too many IK entries ({})", ik_entries.len())))?;

    let mut out = vec![0u8; SKELETON_HEADER_SIZE];
    LittleEndian::write_u16(&mut out[0x00..0x02], node_count);
    LittleEndian::write_u16(&mut out[0x02..0x04], ik_count);

    let first_child = |id: usize| {
        nodes
            .iter()
            .position(|n| n.parent == Some(id))
            .map_or(NO_PARENT, |c| c as u16)
    };
    let next_sibling = |id: usize| {
        let parent = nodes[id].parent;
        nodes
            .iter()
            .enumerate()
            .skip(id + 1)
            .find(|(_, n)| n.parent == parent)
            .map_or(NO_PARENT, |(s, _)| s as u16)
    };

    let node_table = out.len();
    LittleEndian::write_u32(&mut out[0x08..0x0C], node_table as u32);
    for (id, node) in nodes.iter().enumerate() {
        out.extend_from_slice(&(node.parent.map_or(NO_PARENT, |p| p as u16)).to_le_bytes());
        out.extend_from_slice(&first_child(id).to_le_bytes());
        out.extend_from_slice(&next_sibling(id).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&node.bit_flag.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        write_matrix(&mut out, &node.matrix);
        write_matrix(&mut out, &node.pre_matrix);
    }
    debug_assert_eq!(out.len(), node_table + nodes.len() * NODE_RECORD_SIZE);

    if !ik_entries.is_empty() {
        let ik_table = out.len();
        LittleEndian::write_u32(&mut out[0x10..0x14], ik_table as u32);
        for entry in ik_entries {
            let id_count = u8::try_from(entry.node_ids.len()).map_err(|_| {
                Error::encode(format!("IK entry has {} node ids", entry.node_ids.len()))
            })?;
            let float_count = u16::try_from(entry.floats.len()).map_err(|_| {
                Error::encode(format!("IK entry has {} floats", entry.floats.len()))
            })?;
            let start = out.len();
            out.push(entry.method);
            out.push(entry.solver_flags);
            out.push(entry.variant_flags);
            out.push(id_count);
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&float_count.to_le_bytes());
            for &id in &entry.node_ids {
                out.extend_from_slice(&id.to_le_bytes());
            }
            pad4(&mut out);
            for &f in &entry.floats {
                out.extend_from_slice(&f.to_le_bytes());
            }
            let size = u16::try_from(out.len() - start)
                .map_err(|_| Error::encode("IK entry too large"))?;
            LittleEndian::write_u16(&mut out[start + 4..start + 6], size);
        }
    }

    if with_bind_matrices {
        let bind_table = out.len();
        LittleEndian::write_u32(&mut out[0x14..0x18], bind_table as u32);
        for node in nodes {
            write_matrix(&mut out, &node.bind_matrix());
        }
    }

    let name_table = out.len();
    LittleEndian::write_u32(&mut out[0x0C..0x10], name_table as u32);
    out.resize(name_table + nodes.len() * 4, 0);
    for (i, node) in nodes.iter().enumerate() {
        let at = out.len();
        LittleEndian::write_u32(&mut out[name_table + i * 4..name_table + i * 4 + 4], at as u32);
        out.extend_from_slice(node.name.as_bytes());
        out.push(0);
    }
    pad4(&mut out);
    Ok(out)
}

/// Encodes one animation block; offsets inside it are relative to its first byte.
///
/// Step and index widths follow each track's `0x20`/`0x40` flags; values that do not fit the
/// requested width are rejected rather than truncated.
pub fn encode_animation(animation: &Animation) -> Result<Vec<u8>, Error> {
    let track_count = u16::try_from(animation.tracks.len())
        .map_err(|_| Error::encode(format!("too many tracks in '{}'", animation.name)))?;

    let value_count = u32::try_from(animation.values.len())
        .map_err(|_| Error::encode(format!("value pool of '{}' is too large", animation.name)))?;

    let mut out = Vec::new();
    out.extend_from_slice(&animation.duration.to_le_bytes());
    out.extend_from_slice(&track_count.to_le_bytes());
    out.extend_from_slice(&value_count.to_le_bytes());
    out.extend_from_slice(&animation.reserved.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // name offset
    out.extend_from_slice(&0u32.to_le_bytes()); // value table offset
    debug_assert_eq!(out.len(), ANIMATION_HEADER_SIZE);
    let track_table = out.len();
    out.resize(track_table + animation.tracks.len() * 4, 0);

    for (i, track) in animation.tracks.iter().enumerate() {
        pad4(&mut out);
        let at = out.len();
        write_track(&mut out, track, animation.values.len())?;
        let slot = track_table + i * 4;
        LittleEndian::write_u32(&mut out[slot..slot + 4], at as u32);
    }

    pad4(&mut out);
    let value_table = out.len();
    for &v in &animation.values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    LittleEndian::write_u32(&mut out[0x10..0x14], value_table as u32);

    let name_offset = out.len();
    out.extend_from_slice(animation.name.as_bytes());
    out.push(0);
    pad4(&mut out);
    LittleEndian::write_u32(&mut out[0x0C..0x10], name_offset as u32);
    Ok(out)
}

fn write_track(out: &mut Vec<u8>, track: &CmdTrack, value_count: usize) -> Result<(), Error> {
    let step_count = track.steps.len();
    if track.value_indices.len() != step_count || track.tangent_indices.len() != step_count {
        return Err(Error::encode(format!(
            "track for bone {} has {} steps but {} value / {} tangent indices",
            track.bone_id,
            step_count,
            track.value_indices.len(),
            track.tangent_indices.len()
        )));
    }
    let step_count_u16 = u16::try_from(step_count)
        .map_err(|_| Error::encode(format!("too many steps on bone {}", track.bone_id)))?;

    let start = out.len();
    out.extend_from_slice(&track.bone_id.to_le_bytes());
    out.push(track.transform_type.to_u8());
    out.push(track.bit_flag);
    out.extend_from_slice(&step_count_u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // index table offset
    debug_assert_eq!(out.len() - start, TRACK_HEADER_SIZE);

    let wide_steps = (track.bit_flag & TRACK_WIDE_STEPS) != 0;
    for &step in &track.steps {
        if wide_steps {
            out.extend_from_slice(&step.to_le_bytes());
        } else {
            let step = u8::try_from(step).map_err(|_| {
                Error::encode(format!(
                    "step {step} on bone {} needs the wide-step flag",
                    track.bone_id
                ))
            })?;
            out.push(step);
        }
    }
    pad4(out);

    let index_table = out.len() - start;
    let index_table = u16::try_from(index_table)
        .map_err(|_| Error::encode(format!("track for bone {} is too large", track.bone_id)))?;
    LittleEndian::write_u16(&mut out[start + 6..start + 8], index_table);

    let wide = (track.bit_flag & TRACK_WIDE_INDICES) != 0;
    let (tangent_flag, mask) = if wide {
        (WIDE_TANGENT_FLAG, WIDE_INDEX_MASK)
    } else {
        (NARROW_TANGENT_FLAG, NARROW_INDEX_MASK)
    };
    for (&value, &tangent) in track.value_indices.iter().zip(&track.tangent_indices) {
        if value > mask {
            return Err(Error::encode(format!(
                "value index {value} on bone {} needs the wide-index flag",
                track.bone_id
            )));
        }
        let mut raw = value;
        if let Some(tangent) = tangent {
            if tangent != value + 1 {
                return Err(Error::encode(format!(
                    "tangent slot {tangent} must directly follow value slot {value}"
                )));
            }
            raw |= tangent_flag;
        }
        let last_slot = tangent.unwrap_or(value) as usize;
        if last_slot >= value_count {
            return Err(Error::encode(format!(
                "value index {last_slot} out of range (value count {value_count})"
            )));
        }
        if wide {
            out.extend_from_slice(&raw.to_le_bytes());
        } else {
            out.extend_from_slice(&(raw as u16).to_le_bytes());
        }
    }
    pad4(out);
    Ok(())
}
