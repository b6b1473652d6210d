use crate::math::{Aabb, Quat, Transform, Vec3};
use crate::snapshot::{SnapshotError, FORMAT_VERSION, MAGIC};
use crate::storage::SlotId;
use crate::world::manager::{EncodedComponent, RestoreError};
use crate::world::{
    ComponentHandle, ComponentTypeId, GameObject, ObjectDesc, ObjectHandle, World, WorldEvent,
};
use byteorder::{ReadBytesExt, LE};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read};

/// What [`read_world`] restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    /// Name of the world the snapshot was written from.
    pub world_name: String,
    pub objects: usize,
    pub components: usize,
    /// Components of types this world does not know or cannot decode.
    pub skipped_components: usize,
}

struct SavedType {
    name: String,
    current: Option<ComponentTypeId>,
}

/// Load a snapshot into `world`, which must not contain any objects or
/// components.
///
/// Objects and components get back their saved handles. Component types
/// are matched by name; payloads of types missing from this world's
/// registry are skipped. Restored components are initialized by the next
/// update, like freshly created ones.
pub fn read_world<R: Read>(world: &mut World, mut input: R) -> Result<LoadSummary, SnapshotError> {
    world.reclaim_deleted();
    let has_components = world
        .managers
        .iter()
        .flatten()
        .any(|manager| manager.live_count() > 0);
    if !world.objects().is_empty() || has_components {
        return Err(SnapshotError::WorldNotEmpty);
    }

    let loaded = restore_world(world, &mut input);
    if loaded.is_err() {
        discard_partial_load(world);
    }
    loaded
}

fn restore_world<R: Read>(world: &mut World, mut input: R) -> Result<LoadSummary, SnapshotError> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(SnapshotError::BadMagic(magic));
    }
    let version = input.read_u32::<LE>()?;
    if version > FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let world_name = read_str(&mut input)?;

    let type_count = input.read_u32::<LE>()?;
    let mut types: HashMap<u16, SavedType> = HashMap::new();
    for _ in 0..type_count {
        let saved_id = input.read_u16::<LE>()?;
        let name = read_str(&mut input)?;
        let _serializable = input.read_u8()? != 0;
        let current = world.registry().component_id_by_name(&name);
        if current.is_none() {
            tracing::warn!(component = %name, "snapshot component type is not registered here");
        }
        types.insert(saved_id, SavedType { name, current });
    }

    let object_count = input.read_u32::<LE>()?;
    let mut attached: Vec<(ObjectHandle, Vec<ComponentHandle>)> = Vec::new();
    for _ in 0..object_count {
        let (handle, tags) = read_object(world, &mut input, &types)?;
        attached.push((handle, tags));
    }

    let block_count = input.read_u32::<LE>()?;
    let mut restored: HashSet<ComponentHandle> = HashSet::new();
    let mut skipped = 0;
    for _ in 0..block_count {
        let saved_id = input.read_u16::<LE>()?;
        let saved = types.get(&saved_id);
        let current = saved.and_then(|saved| saved.current);
        let type_name = saved.map_or_else(|| format!("#{saved_id}"), |saved| saved.name.clone());
        let count = input.read_u32::<LE>()?;
        for _ in 0..count {
            let slot = read_slot(&mut input)?;
            let owner = ObjectHandle::new(read_slot(&mut input)?);
            let active_flag = input.read_u8()? != 0;
            let payload = read_bytes(&mut input)?;

            let Some(type_id) = current else {
                skipped += 1;
                continue;
            };
            let Some(owner_active) = world.objects.get(owner).map(|object| object.active) else {
                tracing::warn!(component = %type_name, owner = %owner, "component owner missing from snapshot");
                skipped += 1;
                continue;
            };
            let Some(manager) = world.managers.get_mut(type_id.index()).and_then(Option::as_mut) else {
                skipped += 1;
                continue;
            };
            let component = EncodedComponent {
                slot,
                owner,
                active_flag,
                payload,
            };
            match manager.restore_encoded(&component, owner_active) {
                Ok(()) => {
                    restored.insert(ComponentHandle::new(type_id, slot));
                }
                Err(RestoreError::NotSerializable) => skipped += 1,
                Err(RestoreError::Decode(source)) => {
                    return Err(SnapshotError::Decode { type_name, source })
                }
                Err(RestoreError::Handle(error)) => return Err(error.into()),
            }
        }
    }

    for (handle, tags) in &attached {
        if let Some(object) = world.objects.get_mut(*handle) {
            object.components = tags
                .iter()
                .copied()
                .filter(|tag| restored.contains(tag))
                .collect();
        }
    }

    world.objects.update_all();
    world.sync_moved();
    for (handle, tags) in &attached {
        world.events.publish(WorldEvent::ObjectCreated(*handle));
        for &component in tags.iter().filter(|tag| restored.contains(tag)) {
            world.events.publish(WorldEvent::ComponentCreated {
                component,
                owner: *handle,
            });
        }
    }

    let summary = LoadSummary {
        world_name,
        objects: attached.len(),
        components: restored.len(),
        skipped_components: skipped,
    };
    tracing::debug!(
        world = world.name(),
        objects = summary.objects,
        components = summary.components,
        skipped = summary.skipped_components,
        "snapshot loaded"
    );
    Ok(summary)
}

/// Drop everything a failed load put into `world`. Nothing was initialized
/// or announced yet, so storage is reset without callbacks or events.
fn discard_partial_load(world: &mut World) {
    world.objects.clear();
    for manager in world.managers.iter_mut().flatten() {
        manager.clear();
    }
    if let Some(spatial) = &mut world.spatial {
        spatial.clear();
    }
    tracing::warn!(world = world.name(), "snapshot load failed, partial state discarded");
}

fn read_object<R: Read>(
    world: &mut World,
    input: &mut R,
    types: &HashMap<u16, SavedType>,
) -> Result<(ObjectHandle, Vec<ComponentHandle>), SnapshotError> {
    let handle = ObjectHandle::new(read_slot(input)?);
    let parent = match input.read_u8()? {
        0 => None,
        _ => Some(ObjectHandle::new(read_slot(input)?)),
    };
    let name = read_str(input)?;
    let global_key = match input.read_u8()? {
        0 => None,
        _ => Some(read_str(input)?),
    };
    let active = input.read_u8()? != 0;
    let team_id = input.read_u16::<LE>()?;
    let local = read_transform(input)?;
    let local_bounds = match input.read_u8()? {
        0 => None,
        _ => Some(read_bounds(input)?),
    };
    let spatial_category = input.read_u32::<LE>()?;

    let tag_count = input.read_u32::<LE>()?;
    let mut tags = Vec::new();
    for _ in 0..tag_count {
        let saved_type = input.read_u16::<LE>()?;
        let slot = read_slot(input)?;
        if let Some(type_id) = types.get(&saved_type).and_then(|saved| saved.current) {
            tags.push(ComponentHandle::new(type_id, slot));
        }
    }

    let desc = ObjectDesc {
        name,
        parent: None,
        local,
        active,
        team_id,
        global_key: None,
        local_bounds,
        spatial_category,
    };
    let mut object = GameObject::from_desc(handle, &desc);
    if let Some(parent) = parent {
        let Some(parent_object) = world.objects.get(parent) else {
            return Err(SnapshotError::MissingParent {
                index: handle.index(),
                parent: parent.index(),
            });
        };
        object.parent = Some(parent);
        object.level = parent_object.level + 1;
        object.active = active && parent_object.active;
    }
    world.objects.restore(handle, object)?;
    if let Some(parent) = parent.and_then(|parent| world.objects.get_mut(parent)) {
        parent.children.push(handle);
    }
    if let Some(key) = global_key {
        if world.objects.claim_global_key(&key, handle) {
            if let Some(object) = world.objects.get_mut(handle) {
                object.global_key = Some(key);
            }
        }
    }
    Ok((handle, tags))
}

fn read_slot<R: Read>(input: &mut R) -> Result<SlotId, SnapshotError> {
    let index = input.read_u32::<LE>()?;
    let generation = input.read_u16::<LE>()?;
    Ok(SlotId::new(index, generation))
}

fn read_bytes<R: Read>(input: &mut R) -> Result<Vec<u8>, SnapshotError> {
    let len = input.read_u32::<LE>()? as u64;
    let mut bytes = Vec::new();
    input.by_ref().take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(bytes)
}

fn read_str<R: Read>(input: &mut R) -> Result<String, SnapshotError> {
    Ok(String::from_utf8(read_bytes(input)?)?)
}

fn read_vec3<R: Read>(input: &mut R) -> Result<Vec3, SnapshotError> {
    let x = input.read_f32::<LE>()?;
    let y = input.read_f32::<LE>()?;
    let z = input.read_f32::<LE>()?;
    Ok(Vec3::new(x, y, z))
}

fn read_transform<R: Read>(input: &mut R) -> Result<Transform, SnapshotError> {
    let position = read_vec3(input)?;
    let mut rotation = [0f32; 4];
    input.read_f32_into::<LE>(&mut rotation)?;
    let scale = read_vec3(input)?;
    Ok(Transform::new(position, Quat::from_array(rotation), scale))
}

fn read_bounds<R: Read>(input: &mut R) -> Result<Aabb, SnapshotError> {
    let min = read_vec3(input)?;
    let max = read_vec3(input)?;
    Ok(Aabb::new(min, max))
}
