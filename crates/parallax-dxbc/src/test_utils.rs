//! Builders for synthetic shader blobs used by tests across the workspace.

use crate::FourCC;

/// Builds a minimal `DXBC` container holding `chunks`.
///
/// The checksum is left zeroed; parsing never validates it.
pub fn build_container(chunks: &[(FourCC, &[u8])]) -> Vec<u8> {
    let header_size = 4 + 16 + 4 + 4 + 4 + 4 * chunks.len();
    let mut out = Vec::with_capacity(header_size + chunks.iter().map(|(_, d)| 8 + d.len()).sum::<usize>());

    out.extend_from_slice(&FourCC::DXBC.0);
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // total_size, patched below
    out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());

    let offsets_pos = out.len();
    out.resize(out.len() + 4 * chunks.len(), 0);

    for (i, (fourcc, data)) in chunks.iter().enumerate() {
        let offset = out.len() as u32;
        out[offsets_pos + i * 4..offsets_pos + i * 4 + 4].copy_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&fourcc.0);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }

    let total_size = out.len() as u32;
    out[24..28].copy_from_slice(&total_size.to_le_bytes());
    out
}

/// A constant for [`build_rdef`].
pub struct RdefVariableSpec<'a> {
    pub name: &'a str,
    pub offset: u32,
    pub size: u32,
    /// Parameter class written to the type record.
    pub class: u16,
}

/// Builds an SM4 `RDEF` payload with one constant buffer per entry of `buffers`.
pub fn build_rdef(buffers: &[(&str, u32, &[RdefVariableSpec<'_>])]) -> Vec<u8> {
    const HEADER: usize = 28;
    const CB: usize = 24;
    const VAR: usize = 24;
    const TYPE: usize = 16;

    let var_total: usize = buffers.iter().map(|(_, _, v)| v.len()).sum();
    let cb_table = HEADER;
    let var_table = cb_table + buffers.len() * CB;
    let type_table = var_table + var_total * VAR;
    let strings_start = type_table + var_total * TYPE;

    let mut strings = Vec::new();
    let mut push_str = |s: &str| -> u32 {
        let at = (strings_start + strings.len()) as u32;
        strings.extend_from_slice(s.as_bytes());
        strings.push(0);
        at
    };

    let mut out = Vec::new();
    out.extend_from_slice(&(buffers.len() as u32).to_le_bytes());
    out.extend_from_slice(&(cb_table as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // bound resources
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0xFFFE_0400u32.to_le_bytes()); // vs_4_0
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // creator

    let mut var_cursor = 0usize;
    let mut cb_entries = Vec::new();
    let mut var_entries = Vec::new();
    let mut type_entries = Vec::new();
    for (name, size, vars) in buffers {
        let name_at = push_str(name);
        cb_entries.extend_from_slice(&name_at.to_le_bytes());
        cb_entries.extend_from_slice(&(vars.len() as u32).to_le_bytes());
        cb_entries.extend_from_slice(&((var_table + var_cursor * VAR) as u32).to_le_bytes());
        cb_entries.extend_from_slice(&size.to_le_bytes());
        cb_entries.extend_from_slice(&0u32.to_le_bytes());
        cb_entries.extend_from_slice(&0u32.to_le_bytes());

        for var in vars.iter() {
            let vname_at = push_str(var.name);
            let type_at = (type_table + var_cursor * TYPE) as u32;
            var_entries.extend_from_slice(&vname_at.to_le_bytes());
            var_entries.extend_from_slice(&var.offset.to_le_bytes());
            var_entries.extend_from_slice(&var.size.to_le_bytes());
            var_entries.extend_from_slice(&2u32.to_le_bytes()); // used
            var_entries.extend_from_slice(&type_at.to_le_bytes());
            var_entries.extend_from_slice(&0u32.to_le_bytes());

            let (rows, cols) = if var.class >= 2 { (4u16, 4u16) } else { (1, 4) };
            type_entries.extend_from_slice(&var.class.to_le_bytes());
            type_entries.extend_from_slice(&3u16.to_le_bytes()); // float
            type_entries.extend_from_slice(&rows.to_le_bytes());
            type_entries.extend_from_slice(&cols.to_le_bytes());
            type_entries.extend_from_slice(&[0u8; 8]);
            var_cursor += 1;
        }
    }

    out.extend_from_slice(&cb_entries);
    out.extend_from_slice(&var_entries);
    out.extend_from_slice(&type_entries);
    out.extend_from_slice(&strings);
    out
}

/// A constant for [`build_ctab`].
pub struct CtabConstantSpec<'a> {
    pub name: &'a str,
    pub register_index: u16,
    pub register_count: u16,
    /// Parameter class written to the type record.
    pub class: u16,
}

/// Builds a `CTAB` payload (float4 register set, no defaults).
pub fn build_ctab(target: &str, constants: &[CtabConstantSpec<'_>]) -> Vec<u8> {
    const HEADER: usize = 28;
    const INFO: usize = 20;
    const TYPE: usize = 16;

    let info_table = HEADER;
    let type_table = info_table + constants.len() * INFO;
    let strings_start = type_table + constants.len() * TYPE;

    let mut strings = Vec::new();
    let mut push_str = |s: &str| -> u32 {
        let at = (strings_start + strings.len()) as u32;
        strings.extend_from_slice(s.as_bytes());
        strings.push(0);
        at
    };
    let target_at = push_str(target);

    let mut infos = Vec::new();
    let mut types = Vec::new();
    for (i, c) in constants.iter().enumerate() {
        let name_at = push_str(c.name);
        infos.extend_from_slice(&name_at.to_le_bytes());
        infos.extend_from_slice(&2u16.to_le_bytes()); // float4
        infos.extend_from_slice(&c.register_index.to_le_bytes());
        infos.extend_from_slice(&c.register_count.to_le_bytes());
        infos.extend_from_slice(&0u16.to_le_bytes());
        infos.extend_from_slice(&((type_table + i * TYPE) as u32).to_le_bytes());
        infos.extend_from_slice(&0u32.to_le_bytes());

        let (rows, cols) = if c.register_count == 4 { (4u16, 4u16) } else { (1, 4) };
        types.extend_from_slice(&c.class.to_le_bytes());
        types.extend_from_slice(&3u16.to_le_bytes());
        types.extend_from_slice(&rows.to_le_bytes());
        types.extend_from_slice(&cols.to_le_bytes());
        types.extend_from_slice(&1u16.to_le_bytes()); // elements
        types.extend_from_slice(&[0u8; 6]);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&(HEADER as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // creator
    out.extend_from_slice(&0xFFFE_0300u32.to_le_bytes());
    out.extend_from_slice(&(constants.len() as u32).to_le_bytes());
    out.extend_from_slice(&(info_table as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&target_at.to_le_bytes());
    out.extend_from_slice(&infos);
    out.extend_from_slice(&types);
    out.extend_from_slice(&strings);
    out
}

/// Wraps a `CTAB` payload into a vs_3_0 token stream: version, comment block, `end`.
pub fn build_sm3_vertex_shader(ctab: &[u8]) -> Vec<u8> {
    let mut padded = FourCC::CTAB.0.to_vec();
    padded.extend_from_slice(ctab);
    while padded.len() % 4 != 0 {
        padded.push(0);
    }
    let dwords = (padded.len() / 4) as u32;

    let mut out = Vec::new();
    out.extend_from_slice(&0xFFFE_0300u32.to_le_bytes());
    out.extend_from_slice(&((dwords << 16) | 0xFFFE).to_le_bytes());
    out.extend_from_slice(&padded);
    out.extend_from_slice(&0x0000_FFFFu32.to_le_bytes());
    out
}
