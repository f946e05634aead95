// SPDX-License-Identifier: GPL-2.0

//! ELF section extraction
//!
//! Relocatable objects carry the map definitions in a `maps` section
//! and one program per text section, with `.rel<section>` relocations
//! patching the `imm` field of the wide map-fd loads with the index of
//! the referenced map.

use object::{Object, ObjectSection, ObjectSymbol, RelocationTarget};

use super::{LoadError, RawProgram};
use crate::asm::parse_raw;
use crate::spec::maps::{MapDef, MAP_DEF_SIZE};
use crate::spec::{ProgType, ProgramInfo};

/// Extract every program of the object file in `data`.
pub fn read_elf(
    data: &[u8],
    filename: &str,
    desired_section: Option<&str>,
    type_override: Option<ProgType>,
) -> Result<Vec<RawProgram>, LoadError> {
    let file = object::File::parse(data)?;

    let mut map_defs: Vec<MapDef> = Vec::new();
    if let Some(section) = file.section_by_name("maps") {
        let bytes = section.data()?;
        if bytes.len() % MAP_DEF_SIZE != 0 {
            return Err(LoadError::MalformedMaps(bytes.len()));
        }
        for chunk in bytes.chunks_exact(MAP_DEF_SIZE) {
            map_defs.push(MapDef::parse(chunk).expect("chunk has the exact size"));
        }
    }

    let mut programs = Vec::new();
    for section in file.sections() {
        let name = section.name().unwrap_or("").to_string();
        if name.is_empty()
            || name.starts_with('.')
            || matches!(name.as_str(), "license" | "version" | "maps")
        {
            continue;
        }
        if let Some(wanted) = desired_section {
            if name != wanted {
                continue;
            }
        }
        let bytes = section.data()?;
        if bytes.is_empty() {
            continue;
        }
        let mut records = parse_raw(bytes)?;

        // Relocations point map-fd loads at their map definition; the
        // symbol's address is its byte offset inside the maps section.
        for (offset, reloc) in section.relocations() {
            let slot = (offset / 8) as usize;
            let RelocationTarget::Symbol(sym_idx) = reloc.target() else {
                continue;
            };
            let Ok(symbol) = file.symbol_by_index(sym_idx) else {
                continue;
            };
            if let Some(record) = records.get_mut(slot) {
                record.src = 1;
                record.imm = (symbol.address() / MAP_DEF_SIZE as u64) as i32;
            }
        }

        let prog_type = type_override.unwrap_or_else(|| ProgType::from_section(&name));
        programs.push(RawProgram {
            filename: filename.to_string(),
            section: name,
            records,
            info: ProgramInfo::new(prog_type, map_defs.clone()),
        });
    }

    if programs.is_empty() {
        return Err(LoadError::NoProgram);
    }
    Ok(programs)
}
