use crate::math::{Aabb, Transform, Vec3};
use crate::snapshot::{SnapshotError, FORMAT_VERSION, MAGIC};
use crate::world::{ComponentHandle, GameObject, ObjectHandle, World};
use byteorder::{WriteBytesExt, LE};
use std::io::Write;

/// Write every live object and every serializable component of `world`.
///
/// Components of types registered without a codec are listed in their
/// owner's record but carry no payload, so they are dropped on load.
pub fn write_world<W: Write>(world: &World, mut out: W) -> Result<(), SnapshotError> {
    out.write_all(&MAGIC)?;
    out.write_u32::<LE>(FORMAT_VERSION)?;
    write_str(&mut out, world.name())?;

    let types = world.registry().components();
    out.write_u32::<LE>(types.len() as u32)?;
    for info in types {
        out.write_u16::<LE>(info.id().raw())?;
        write_str(&mut out, info.name())?;
        out.write_u8(info.is_serializable() as u8)?;
    }

    let objects = world.objects();
    let ordered: Vec<ObjectHandle> = objects
        .roots()
        .flat_map(|root| objects.subtree(root))
        .collect();
    out.write_u32::<LE>(ordered.len() as u32)?;
    for object in ordered.iter().filter_map(|&handle| objects.get(handle)) {
        write_object(&mut out, object)?;
    }

    let blocks: Vec<_> = world
        .managers
        .iter()
        .flatten()
        .filter(|manager| manager.is_serializable())
        .collect();
    out.write_u32::<LE>(blocks.len() as u32)?;
    for manager in blocks {
        let type_name = manager.type_name();
        let components = manager
            .encode_all()
            .map_err(|source| SnapshotError::Encode { type_name, source })?;
        let type_id = world
            .registry()
            .component_id_by_name(type_name)
            .map_or(u16::MAX, |id| id.raw());
        out.write_u16::<LE>(type_id)?;
        out.write_u32::<LE>(components.len() as u32)?;
        for component in components {
            write_handle(&mut out, component.slot.index(), component.slot.generation())?;
            write_handle(&mut out, component.owner.index(), component.owner.generation())?;
            out.write_u8(component.active_flag as u8)?;
            out.write_u32::<LE>(component.payload.len() as u32)?;
            out.write_all(&component.payload)?;
        }
    }

    tracing::debug!(world = world.name(), objects = objects.len(), "snapshot written");
    Ok(())
}

fn write_object<W: Write>(out: &mut W, object: &GameObject) -> Result<(), SnapshotError> {
    let handle = object.handle();
    write_handle(out, handle.index(), handle.generation())?;
    match object.parent() {
        Some(parent) => {
            out.write_u8(1)?;
            write_handle(out, parent.index(), parent.generation())?;
        }
        None => out.write_u8(0)?,
    }
    write_str(out, object.name())?;
    match object.global_key() {
        Some(key) => {
            out.write_u8(1)?;
            write_str(out, key)?;
        }
        None => out.write_u8(0)?,
    }
    out.write_u8(object.active_flag() as u8)?;
    out.write_u16::<LE>(object.team_id())?;
    write_transform(out, object.local_transform())?;
    match object.local_bounds() {
        Some(bounds) => {
            out.write_u8(1)?;
            write_bounds(out, &bounds)?;
        }
        None => out.write_u8(0)?,
    }
    out.write_u32::<LE>(object.spatial_category())?;

    let components: &[ComponentHandle] = object.components();
    out.write_u32::<LE>(components.len() as u32)?;
    for component in components {
        out.write_u16::<LE>(component.type_id().raw())?;
        write_handle(out, component.slot().index(), component.slot().generation())?;
    }
    Ok(())
}

fn write_handle<W: Write>(out: &mut W, index: u32, generation: u16) -> Result<(), SnapshotError> {
    out.write_u32::<LE>(index)?;
    out.write_u16::<LE>(generation)?;
    Ok(())
}

fn write_str<W: Write>(out: &mut W, value: &str) -> Result<(), SnapshotError> {
    out.write_u32::<LE>(value.len() as u32)?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

fn write_vec3<W: Write>(out: &mut W, value: Vec3) -> Result<(), SnapshotError> {
    for component in value.to_array() {
        out.write_f32::<LE>(component)?;
    }
    Ok(())
}

fn write_transform<W: Write>(out: &mut W, transform: &Transform) -> Result<(), SnapshotError> {
    write_vec3(out, transform.position)?;
    for component in transform.rotation.to_array() {
        out.write_f32::<LE>(component)?;
    }
    write_vec3(out, transform.scale)
}

fn write_bounds<W: Write>(out: &mut W, bounds: &Aabb) -> Result<(), SnapshotError> {
    write_vec3(out, bounds.min)?;
    write_vec3(out, bounds.max)
}
