//! WGSL sources
//!
//! The compute kernels share [`PARTICLE_COMMON`] (record layout, free-list,
//! PCG hash). [`compute_shader`] glues a kernel to it and fills in the
//! work-group size.

/// Record layout, free-list primitives and random numbers
pub const PARTICLE_COMMON: &str = r#"
// ============================================================================
// Ricochet particle common
// ============================================================================

struct Particle {
    position: vec3<f32>,
    is_active: u32,
    velocity: vec3<f32>,
    scale: f32,
    rotation: vec3<f32>,
    age: f32,
    angular_velocity: vec3<f32>,
    lifetime: f32,
    color: vec4<f32>,
}

struct FreeList {
    count: atomic<u32>,
    indices: array<u32>,
}

@group(0) @binding(0) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(1) var<storage, read_write> free_list: FreeList;

const NO_SLOT: u32 = 0xffffffffu;

// Pop one slot index, NO_SLOT when the list is empty
fn consume_slot() -> u32 {
    var slot = NO_SLOT;
    var current = atomicLoad(&free_list.count);
    loop {
        if (current == 0u) {
            break;
        }
        let result = atomicCompareExchangeWeak(&free_list.count, current, current - 1u);
        if (result.exchanged) {
            slot = free_list.indices[current - 1u];
            break;
        }
        current = result.old_value;
    }
    return slot;
}

// Push one slot index; dropped when the list is full
fn append_slot(index: u32) {
    let capacity = arrayLength(&free_list.indices);
    var current = atomicLoad(&free_list.count);
    loop {
        if (current >= capacity) {
            break;
        }
        let result = atomicCompareExchangeWeak(&free_list.count, current, current + 1u);
        if (result.exchanged) {
            free_list.indices[current] = index;
            break;
        }
        current = result.old_value;
    }
}

// PCG random number generator
fn pcg_hash(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn random_float(seed: ptr<function, u32>) -> f32 {
    *seed = pcg_hash(*seed);
    return f32(*seed) / 4294967295.0;
}

fn random_centered(seed: ptr<function, u32>) -> vec3<f32> {
    let x = random_float(seed) - 0.5;
    let y = random_float(seed) - 0.5;
    let z = random_float(seed) - 0.5;
    return vec3<f32>(x, y, z);
}
"#;

/// Init kernel: every slot inactive, every index on the free-list
pub const INIT_KERNEL: &str = r#"
@compute @workgroup_size({{WORKGROUP_SIZE}})
fn init(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if (index >= arrayLength(&particles)) {
        return;
    }
    particles[index] = Particle();
    append_slot(index);
}
"#;

/// Emit kernel: one invocation per granted particle
pub const EMIT_KERNEL: &str = r#"
struct EmitUniforms {
    anchor: vec3<f32>,
    granted: u32,
    velocity: vec3<f32>,
    seed: u32,
    velocity_spread: vec3<f32>,
    scale: f32,
    range: vec3<f32>,
    lifetime: f32,
    angular_velocity: vec3<f32>,
    _pad: f32,
    color: vec4<f32>,
}

@group(1) @binding(0) var<uniform> emit_params: EmitUniforms;

const TAU: f32 = 6.283185307;

@compute @workgroup_size({{WORKGROUP_SIZE}})
fn emit(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let invocation = global_id.x;
    if (invocation >= emit_params.granted) {
        return;
    }

    let slot = consume_slot();
    if (slot == NO_SLOT) {
        return;
    }

    var seed = pcg_hash(emit_params.seed ^ pcg_hash(invocation));

    var p: Particle;
    p.position = emit_params.anchor + random_centered(&seed) * emit_params.range;
    p.velocity = emit_params.velocity + random_centered(&seed) * emit_params.velocity_spread;
    let rx = random_float(&seed);
    let ry = random_float(&seed);
    let rz = random_float(&seed);
    p.rotation = vec3<f32>(rx, ry, rz) * TAU;
    p.angular_velocity = random_centered(&seed) * 2.0 * emit_params.angular_velocity;
    p.scale = emit_params.scale;
    p.age = 0.0;
    p.lifetime = emit_params.lifetime;
    p.color = emit_params.color;
    p.is_active = 1u;

    particles[slot] = p;
}
"#;

/// Update kernel: integrate, collide against the captured scene, retire
pub const UPDATE_KERNEL: &str = r#"
struct UpdateUniforms {
    view_proj: mat4x4<f32>,
    gravity: vec3<f32>,
    delta_time: f32,
    extent: vec2<u32>,
    capacity: u32,
    collision_enabled: u32,
    damping: f32,
    depth_epsilon: f32,
    _pad: vec2<f32>,
}

@group(1) @binding(0) var<uniform> update_params: UpdateUniforms;
@group(1) @binding(1) var scene_depth: texture_depth_2d;
@group(1) @binding(2) var scene_normal: texture_2d<f32>;

fn collide(previous: vec3<f32>, position: vec3<f32>, velocity: vec3<f32>) -> vec3<f32> {
    let clip = update_params.view_proj * vec4<f32>(position, 1.0);
    if (clip.w <= 0.0) {
        return velocity;
    }
    let ndc = clip.xyz / clip.w;
    if (abs(ndc.x) > 1.0 || abs(ndc.y) > 1.0 || ndc.z < 0.0 || ndc.z > 1.0) {
        return velocity;
    }

    let previous_clip = update_params.view_proj * vec4<f32>(previous, 1.0);
    if (previous_clip.w <= 0.0) {
        return velocity;
    }
    let previous_depth = previous_clip.z / previous_clip.w;

    // Texture rows grow downward
    let size = vec2<f32>(update_params.extent);
    let max_pixel = vec2<f32>(update_params.extent - vec2<u32>(1u, 1u));
    let pixel_f = vec2<f32>((ndc.x * 0.5 + 0.5) * size.x, (0.5 - ndc.y * 0.5) * size.y);
    let pixel = vec2<u32>(clamp(pixel_f, vec2<f32>(0.0), max_pixel));

    let surface_depth = textureLoad(scene_depth, pixel, 0);
    let normal = textureLoad(scene_normal, pixel, 0).xyz * 2.0 - 1.0;

    let was_in_front = previous_depth <= surface_depth;
    let touches = ndc.z + update_params.depth_epsilon >= surface_depth;
    let approaching = dot(velocity, normal) < 0.0;
    if (was_in_front && touches && approaching) {
        return reflect(velocity, normal) * update_params.damping;
    }
    return velocity;
}

@compute @workgroup_size({{WORKGROUP_SIZE}})
fn update(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if (index >= update_params.capacity) {
        return;
    }

    var p = particles[index];
    if (p.is_active == 0u) {
        return;
    }

    let dt = update_params.delta_time;
    let previous = p.position;
    var velocity = p.velocity + update_params.gravity * dt;
    let position = previous + velocity * dt;
    p.rotation = p.rotation + p.angular_velocity * dt;

    if (update_params.collision_enabled != 0u) {
        velocity = collide(previous, position, velocity);
    }

    p.position = position;
    p.velocity = velocity;
    p.age = p.age + dt;

    if (p.age >= p.lifetime) {
        p.is_active = 0u;
        particles[index] = p;
        append_slot(index);
        return;
    }
    particles[index] = p;
}
"#;

/// Full-screen copy of scene depth and attributes into the capture targets
pub const GBUFFER_COPY_SHADER: &str = r#"
// ============================================================================
// Ricochet G-buffer capture
// ============================================================================

@group(0) @binding(0) var source_depth: texture_depth_2d;
@group(0) @binding(1) var source_albedo: texture_2d<f32>;
@group(0) @binding(2) var source_specular: texture_2d<f32>;
@group(0) @binding(3) var source_normal: texture_2d<f32>;
@group(0) @binding(4) var source_emission: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
}

struct FragmentOutput {
    @location(0) albedo: vec4<f32>,
    @location(1) specular: vec4<f32>,
    @location(2) normal: vec4<f32>,
    @location(3) emission: vec4<f32>,
    @builtin(frag_depth) depth: f32,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    // One triangle covering the whole target
    let uv = vec2<f32>(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> FragmentOutput {
    let pixel = vec2<i32>(in.position.xy);
    var out: FragmentOutput;
    out.albedo = textureLoad(source_albedo, pixel, 0);
    out.specular = textureLoad(source_specular, pixel, 0);
    out.normal = textureLoad(source_normal, pixel, 0);
    out.emission = textureLoad(source_emission, pixel, 0);
    out.depth = textureLoad(source_depth, pixel, 0);
    return out;
}
"#;

/// Pseudo-instanced particle drawing
pub const PARTICLE_RENDER_SHADER: &str = r#"
// ============================================================================
// Ricochet particle render shader
// ============================================================================

struct Particle {
    position: vec3<f32>,
    is_active: u32,
    velocity: vec3<f32>,
    scale: f32,
    rotation: vec3<f32>,
    age: f32,
    angular_velocity: vec3<f32>,
    lifetime: f32,
    color: vec4<f32>,
}

struct ViewUniforms {
    view_proj: mat4x4<f32>,
    light_dir: vec4<f32>,
}

struct BatchUniforms {
    id_offset: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<storage, read> particles: array<Particle>;
@group(1) @binding(0) var<uniform> camera: ViewUniforms;
@group(2) @binding(0) var<uniform> batch: BatchUniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) instance_id: u32,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) color: vec4<f32>,
}

fn euler_rotation(angles: vec3<f32>) -> mat3x3<f32> {
    let c = cos(angles);
    let s = sin(angles);
    let rx = mat3x3<f32>(
        vec3<f32>(1.0, 0.0, 0.0),
        vec3<f32>(0.0, c.x, s.x),
        vec3<f32>(0.0, -s.x, c.x),
    );
    let ry = mat3x3<f32>(
        vec3<f32>(c.y, 0.0, -s.y),
        vec3<f32>(0.0, 1.0, 0.0),
        vec3<f32>(s.y, 0.0, c.y),
    );
    let rz = mat3x3<f32>(
        vec3<f32>(c.z, s.z, 0.0),
        vec3<f32>(-s.z, c.z, 0.0),
        vec3<f32>(0.0, 0.0, 1.0),
    );
    return ry * rx * rz;
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;

    let index = batch.id_offset + in.instance_id;
    if (index >= arrayLength(&particles)) {
        out.position = vec4<f32>(0.0, 0.0, 1000.0, 1.0);
        out.normal = vec3<f32>(0.0);
        out.color = vec4<f32>(0.0);
        return out;
    }

    let p = particles[index];

    // Skip dead particles (move to clip space far away)
    if (p.is_active == 0u) {
        out.position = vec4<f32>(0.0, 0.0, 1000.0, 1.0);
        out.normal = vec3<f32>(0.0);
        out.color = vec4<f32>(0.0);
        return out;
    }

    let rotation = euler_rotation(p.rotation);
    let world = p.position + rotation * (in.position * p.scale);

    out.position = camera.view_proj * vec4<f32>(world, 1.0);
    out.normal = rotation * in.normal;
    out.color = p.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    let diffuse = max(dot(n, normalize(-camera.light_dir.xyz)), 0.0);
    let shade = 0.3 + 0.7 * diffuse;
    return vec4<f32>(in.color.rgb * shade, in.color.a);
}
"#;

/// Token replaced by the work-group size in compute kernels
const WORKGROUP_SIZE_TOKEN: &str = "{{WORKGROUP_SIZE}}";

/// Prefix `kernel` with the shared particle code and fix its work-group size
pub fn compute_shader(kernel: &str, group_size: u32) -> String {
    [PARTICLE_COMMON, kernel]
        .concat()
        .replace(WORKGROUP_SIZE_TOKEN, &group_size.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_size_substituted() {
        for kernel in [INIT_KERNEL, EMIT_KERNEL, UPDATE_KERNEL] {
            let source = compute_shader(kernel, 32);
            assert!(source.contains("@workgroup_size(32)"));
            assert!(!source.contains(WORKGROUP_SIZE_TOKEN));
            assert!(source.contains("fn consume_slot"));
        }
    }
}
