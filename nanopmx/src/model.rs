use std::path::Path;

use crate::{
    common::{check, Buffer, LanguageType, LoadError, ParseError, F128},
    utils::fourcc,
};

/// Header-derived parse configuration. Read once, validated once, and never
/// mutated afterwards; every section decode is a function of the buffer
/// state and this struct.
#[derive(Default, Clone, Copy, Debug)]
struct Info {
    codec_type: u8,
    additional_uv_size: u8,
    vertex_index_size: u8,
    texture_index_size: u8,
    material_index_size: u8,
    bone_index_size: u8,
    morph_index_size: u8,
    rigid_body_index_size: u8,
}

impl Info {
    fn parse_pmx(buffer: &mut Buffer) -> Result<Info, ParseError> {
        let info = Info {
            codec_type: buffer.read_byte()?,
            additional_uv_size: buffer.read_byte()?,
            vertex_index_size: buffer.read_byte()?,
            texture_index_size: buffer.read_byte()?,
            material_index_size: buffer.read_byte()?,
            bone_index_size: buffer.read_byte()?,
            morph_index_size: buffer.read_byte()?,
            rigid_body_index_size: buffer.read_byte()?,
        };
        check(info.codec_type <= 1, ParseError::InfoCorrupted)?;
        check(info.additional_uv_size <= 4, ParseError::InfoCorrupted)?;
        for index_size in [
            info.vertex_index_size,
            info.texture_index_size,
            info.material_index_size,
            info.bone_index_size,
            info.morph_index_size,
            info.rigid_body_index_size,
        ] {
            check(matches!(index_size, 1 | 2 | 4), ParseError::InfoCorrupted)?;
        }
        Ok(info)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelFormatType {
    Unknown = -1,
    Pmx2_0,
    Pmx2_1,
}

impl From<i32> for ModelFormatType {
    fn from(value: i32) -> Self {
        match value {
            20 => ModelFormatType::Pmx2_0,
            21 => ModelFormatType::Pmx2_1,
            _ => ModelFormatType::Unknown,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CodecType {
    Utf16,
    Utf8,
}

#[derive(Clone, Debug)]
pub struct Model {
    version: f32,
    info_length: u8,
    info: Info,
    name_ja: String,
    name_en: String,
    comment_ja: String,
    comment_en: String,
    vertices: Vec<ModelVertex>,
    surfaces: Vec<ModelSurface>,
    textures: Vec<ModelTexture>,
    materials: Vec<ModelMaterial>,
    bones: Vec<ModelBone>,
    morphs: Vec<ModelMorph>,
    labels: Vec<ModelLabel>,
    rigid_bodies: Vec<ModelRigidBody>,
    joints: Vec<ModelJoint>,
    soft_bodies: Vec<ModelSoftBody>,
}

impl Model {
    /// Parses one PMX document from `buffer`. On success the buffer is
    /// exactly exhausted; on failure no model escapes.
    pub fn load_from_buffer(buffer: &mut Buffer) -> Result<Model, ParseError> {
        let mut model = Model {
            version: 0.0f32,
            info_length: 0u8,
            info: Info::default(),
            name_ja: String::default(),
            name_en: String::default(),
            comment_ja: String::default(),
            comment_en: String::default(),
            vertices: vec![],
            surfaces: vec![],
            textures: vec![],
            materials: vec![],
            bones: vec![],
            morphs: vec![],
            labels: vec![],
            rigid_bodies: vec![],
            joints: vec![],
            soft_bodies: vec![],
        };
        model.load_from_pmx(buffer)?;
        Ok(model)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Model, ParseError> {
        let mut buffer = Buffer::create(bytes);
        Model::load_from_buffer(&mut buffer)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Model, LoadError> {
        let bytes = std::fs::read(path)?;
        Ok(Model::from_bytes(bytes)?)
    }

    fn load_from_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let signature = buffer.read_u32_little_endian()?;
        check(
            signature == fourcc(b'P', b'M', b'X', b' '),
            ParseError::InvalidSignature,
        )?;
        self.version = buffer.read_f32_little_endian()?;
        check(
            !matches!(self.get_format_type(), ModelFormatType::Unknown),
            ParseError::VersionIncompatible,
        )?;
        self.info_length = buffer.read_byte()?;
        check(self.info_length == 8u8, ParseError::InfoCorrupted)?;
        self.info = Info::parse_pmx(buffer)?;
        self.name_ja = self.get_string_pmx(buffer)?;
        self.name_en = self.get_string_pmx(buffer)?;
        self.comment_ja = self.get_string_pmx(buffer)?;
        self.comment_en = self.get_string_pmx(buffer)?;
        self.parse_pmx(buffer)
    }

    fn parse_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        self.parse_vertex_block_pmx(buffer)?;
        self.parse_surface_block_pmx(buffer)?;
        self.parse_texture_block_pmx(buffer)?;
        self.parse_material_block_pmx(buffer)?;
        self.parse_bone_block_pmx(buffer)?;
        self.parse_morph_block_pmx(buffer)?;
        self.parse_label_block_pmx(buffer)?;
        self.parse_rigid_body_block_pmx(buffer)?;
        self.parse_joint_block_pmx(buffer)?;
        if self.get_format_type() == ModelFormatType::Pmx2_1 && !buffer.is_end() {
            self.parse_soft_body_block_pmx(buffer)?;
        }
        check(buffer.is_end(), ParseError::BufferNotEnd)?;
        log::debug!(
            "loaded PMX model \"{}\": {} vertices, {} surfaces, {} materials, {} bones, {} morphs",
            self.name_ja,
            self.vertices.len(),
            self.surfaces.len(),
            self.materials.len(),
            self.bones.len(),
            self.morphs.len(),
        );
        Ok(())
    }

    fn get_string_pmx(&self, buffer: &mut Buffer) -> Result<String, ParseError> {
        let length = buffer.read_len()?;
        if length == 0 {
            return Ok(String::default());
        }
        let src = buffer.read_buffer(length)?;
        let codec = if self.info.codec_type == 1u8 {
            encoding_rs::UTF_8
        } else {
            encoding_rs::UTF_16LE
        };
        let (cow, _, had_errors) = codec.decode(src);
        if had_errors {
            return Err(ParseError::DecodeUnicodeStringFailed);
        }
        Ok(cow.into())
    }

    fn parse_vertex_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_vertices = buffer.read_len()?;
        let mut vertices = Vec::with_capacity(num_vertices);
        for _ in 0..num_vertices {
            vertices.push(ModelVertex::parse_pmx(self, buffer)?);
        }
        self.vertices = vertices;
        Ok(())
    }

    fn parse_surface_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let vertex_index_size = self.info.vertex_index_size as usize;
        let num_vertex_indices = buffer.read_len()?;
        check(num_vertex_indices % 3 == 0, ParseError::FaceCorrupted)?;
        let mut surfaces = Vec::with_capacity(num_vertex_indices / 3);
        for _ in 0..num_vertex_indices / 3 {
            surfaces.push(ModelSurface {
                vertex_indices: [
                    buffer.read_integer(vertex_index_size)?,
                    buffer.read_integer(vertex_index_size)?,
                    buffer.read_integer(vertex_index_size)?,
                ],
            });
        }
        self.surfaces = surfaces;
        Ok(())
    }

    fn parse_texture_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_textures = buffer.read_len()?;
        let mut textures = Vec::with_capacity(num_textures);
        for _ in 0..num_textures {
            textures.push(ModelTexture::parse_pmx(self, buffer)?);
        }
        self.textures = textures;
        Ok(())
    }

    fn parse_material_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_materials = buffer.read_len()?;
        let mut materials = Vec::with_capacity(num_materials);
        for _ in 0..num_materials {
            materials.push(ModelMaterial::parse_pmx(self, buffer)?);
        }
        self.materials = materials;
        Ok(())
    }

    fn parse_bone_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_bones = buffer.read_len()?;
        let mut bones = Vec::with_capacity(num_bones);
        for i in 0..num_bones {
            let mut bone = ModelBone::parse_pmx(self, buffer)?;
            if let Some(ref mut constraint) = bone.constraint {
                constraint.target_bone_index = i as i32;
            }
            bones.push(bone);
        }
        self.bones = bones;
        Ok(())
    }

    fn parse_morph_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_morphs = buffer.read_len()?;
        let mut morphs = Vec::with_capacity(num_morphs);
        for _ in 0..num_morphs {
            morphs.push(ModelMorph::parse_pmx(self, buffer)?);
        }
        self.morphs = morphs;
        Ok(())
    }

    fn parse_label_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_labels = buffer.read_len()?;
        let mut labels = Vec::with_capacity(num_labels);
        for _ in 0..num_labels {
            labels.push(ModelLabel::parse_pmx(self, buffer)?);
        }
        self.labels = labels;
        Ok(())
    }

    fn parse_rigid_body_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_rigid_bodies = buffer.read_len()?;
        let mut rigid_bodies = Vec::with_capacity(num_rigid_bodies);
        for _ in 0..num_rigid_bodies {
            rigid_bodies.push(ModelRigidBody::parse_pmx(self, buffer)?);
        }
        self.rigid_bodies = rigid_bodies;
        Ok(())
    }

    fn parse_joint_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_joints = buffer.read_len()?;
        let mut joints = Vec::with_capacity(num_joints);
        for _ in 0..num_joints {
            joints.push(ModelJoint::parse_pmx(self, buffer)?);
        }
        self.joints = joints;
        Ok(())
    }

    fn parse_soft_body_block_pmx(&mut self, buffer: &mut Buffer) -> Result<(), ParseError> {
        let num_soft_bodies = buffer.read_len()?;
        let mut soft_bodies = Vec::with_capacity(num_soft_bodies);
        for _ in 0..num_soft_bodies {
            soft_bodies.push(ModelSoftBody::parse_pmx(self, buffer)?);
        }
        self.soft_bodies = soft_bodies;
        Ok(())
    }

    pub fn get_format_type(&self) -> ModelFormatType {
        ((self.version * 10f32) as i32).into()
    }

    pub fn get_codec_type(&self) -> CodecType {
        if self.info.codec_type != 0 {
            CodecType::Utf8
        } else {
            CodecType::Utf16
        }
    }

    pub fn get_additional_uv_size(&self) -> usize {
        self.info.additional_uv_size.into()
    }

    pub fn get_name(&self, language_type: LanguageType) -> String {
        match language_type {
            LanguageType::Japanese => self.name_ja.clone(),
            LanguageType::English => self.name_en.clone(),
            LanguageType::Unknown => "".into(),
        }
    }

    pub fn get_comment(&self, language_type: LanguageType) -> String {
        match language_type {
            LanguageType::Japanese => self.comment_ja.clone(),
            LanguageType::English => self.comment_en.clone(),
            LanguageType::Unknown => "".into(),
        }
    }

    pub fn get_all_vertex_objects(&self) -> &Vec<ModelVertex> {
        &self.vertices
    }

    pub fn get_all_surface_objects(&self) -> &Vec<ModelSurface> {
        &self.surfaces
    }

    pub fn get_all_texture_objects(&self) -> &Vec<ModelTexture> {
        &self.textures
    }

    pub fn get_all_material_objects(&self) -> &Vec<ModelMaterial> {
        &self.materials
    }

    pub fn get_all_bone_objects(&self) -> &Vec<ModelBone> {
        &self.bones
    }

    pub fn get_all_morph_objects(&self) -> &Vec<ModelMorph> {
        &self.morphs
    }

    pub fn get_all_label_objects(&self) -> &Vec<ModelLabel> {
        &self.labels
    }

    pub fn get_all_rigid_body_objects(&self) -> &Vec<ModelRigidBody> {
        &self.rigid_bodies
    }

    pub fn get_all_joint_objects(&self) -> &Vec<ModelJoint> {
        &self.joints
    }

    pub fn get_all_soft_body_objects(&self) -> &Vec<ModelSoftBody> {
        &self.soft_bodies
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelVertexType {
    Unknown = -1,
    Bdef1,
    Bdef2,
    Bdef4,
    Sdef,
    Qdef,
}

impl From<i32> for ModelVertexType {
    fn from(v: i32) -> Self {
        match v {
            0 => Self::Bdef1,
            1 => Self::Bdef2,
            2 => Self::Bdef4,
            3 => Self::Sdef,
            4 => Self::Qdef,
            _ => Self::Unknown,
        }
    }
}

/// Weight-deformation payload; exactly one shape per tag. BDEF2/SDEF keep
/// the read weight and its exact complement, BDEF4/QDEF keep all four read
/// weights; nothing is renormalized or clamped.
#[derive(Clone, PartialEq, Debug)]
pub enum ModelVertexU {
    BDEF1 {
        bone_index: i32,
    },
    BDEF2 {
        bone_indices: [i32; 2],
        bone_weights: [f32; 2],
    },
    BDEF4 {
        bone_indices: [i32; 4],
        bone_weights: F128,
    },
    SDEF {
        bone_indices: [i32; 2],
        bone_weights: [f32; 2],
        sdef_c: F128,
        sdef_r0: F128,
        sdef_r1: F128,
    },
    QDEF {
        bone_indices: [i32; 4],
        bone_weights: F128,
    },
}

impl ModelVertexU {
    pub fn typ(&self) -> ModelVertexType {
        match self {
            ModelVertexU::BDEF1 { .. } => ModelVertexType::Bdef1,
            ModelVertexU::BDEF2 { .. } => ModelVertexType::Bdef2,
            ModelVertexU::BDEF4 { .. } => ModelVertexType::Bdef4,
            ModelVertexU::SDEF { .. } => ModelVertexType::Sdef,
            ModelVertexU::QDEF { .. } => ModelVertexType::Qdef,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelVertex {
    pub origin: F128,
    pub normal: F128,
    pub uv: F128,
    pub additional_uv: [F128; 4],
    pub u: ModelVertexU,
    pub edge_size: f32,
}

impl ModelVertex {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelVertex, ParseError> {
        let origin = buffer.read_f32_3_little_endian()?;
        let normal = buffer.read_f32_3_little_endian()?;
        let uv = F128([
            buffer.read_f32_little_endian()?,
            buffer.read_f32_little_endian()?,
            0.0f32,
            0.0f32,
        ]);
        let mut additional_uv = <[F128; 4]>::default();
        for channel in additional_uv
            .iter_mut()
            .take(parent_model.info.additional_uv_size as usize)
        {
            *channel = buffer.read_f32_4_little_endian()?;
        }
        let bone_index_size = parent_model.info.bone_index_size as usize;
        let u = match ModelVertexType::from(buffer.read_byte()? as i32) {
            ModelVertexType::Unknown => return Err(ParseError::VertexCorrupted),
            ModelVertexType::Bdef1 => ModelVertexU::BDEF1 {
                bone_index: buffer.read_integer(bone_index_size)?,
            },
            ModelVertexType::Bdef2 => {
                let bone_indices = [
                    buffer.read_integer(bone_index_size)?,
                    buffer.read_integer(bone_index_size)?,
                ];
                let weight = buffer.read_f32_little_endian()?;
                ModelVertexU::BDEF2 {
                    bone_indices,
                    bone_weights: [weight, 1.0f32 - weight],
                }
            }
            ModelVertexType::Bdef4 => ModelVertexU::BDEF4 {
                bone_indices: [
                    buffer.read_integer(bone_index_size)?,
                    buffer.read_integer(bone_index_size)?,
                    buffer.read_integer(bone_index_size)?,
                    buffer.read_integer(bone_index_size)?,
                ],
                bone_weights: buffer.read_f32_4_little_endian()?,
            },
            ModelVertexType::Sdef => {
                let bone_indices = [
                    buffer.read_integer(bone_index_size)?,
                    buffer.read_integer(bone_index_size)?,
                ];
                let weight = buffer.read_f32_little_endian()?;
                let mut sdef_c = buffer.read_f32_3_little_endian()?;
                sdef_c.0[3] = 1.0f32;
                let mut sdef_r0 = buffer.read_f32_3_little_endian()?;
                sdef_r0.0[3] = 1.0f32;
                let mut sdef_r1 = buffer.read_f32_3_little_endian()?;
                sdef_r1.0[3] = 1.0f32;
                ModelVertexU::SDEF {
                    bone_indices,
                    bone_weights: [weight, 1.0f32 - weight],
                    sdef_c,
                    sdef_r0,
                    sdef_r1,
                }
            }
            ModelVertexType::Qdef => {
                check(
                    parent_model.get_format_type() == ModelFormatType::Pmx2_1,
                    ParseError::VertexCorrupted,
                )?;
                ModelVertexU::QDEF {
                    bone_indices: [
                        buffer.read_integer(bone_index_size)?,
                        buffer.read_integer(bone_index_size)?,
                        buffer.read_integer(bone_index_size)?,
                        buffer.read_integer(bone_index_size)?,
                    ],
                    bone_weights: buffer.read_f32_4_little_endian()?,
                }
            }
        };
        let edge_size = buffer.read_f32_little_endian()?;
        Ok(ModelVertex {
            origin,
            normal,
            uv,
            additional_uv,
            u,
            edge_size,
        })
    }
}

/// One triangle; the surface section's raw index count is always a
/// multiple of 3.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ModelSurface {
    pub vertex_indices: [i32; 3],
}

#[derive(Clone, Debug)]
pub struct ModelTexture {
    pub path: String,
}

impl ModelTexture {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelTexture, ParseError> {
        Ok(ModelTexture {
            path: parent_model.get_string_pmx(buffer)?,
        })
    }
}

#[derive(Default, Clone, Copy, Debug)]
pub struct ModelMaterialFlags {
    pub is_culling_disabled: bool,
    pub is_casting_shadow_enabled: bool,
    pub is_casting_shadow_map_enabled: bool,
    pub is_shadow_map_enabled: bool,
    pub is_edge_enabled: bool,
    pub is_vertex_color_enabled: bool,
    pub is_point_draw_enabled: bool,
    pub is_line_draw_enabled: bool,
}

impl ModelMaterialFlags {
    fn from_u8(value: u8) -> ModelMaterialFlags {
        ModelMaterialFlags {
            is_culling_disabled: value % 2 != 0,
            is_casting_shadow_enabled: (value / 2) % 2 != 0,
            is_casting_shadow_map_enabled: (value / 4) % 2 != 0,
            is_shadow_map_enabled: (value / 8) % 2 != 0,
            is_edge_enabled: (value / 16) % 2 != 0,
            is_vertex_color_enabled: (value / 32) % 2 != 0,
            is_point_draw_enabled: (value / 64) % 2 != 0,
            is_line_draw_enabled: (value / 128) % 2 != 0,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelMaterialSpheremapTextureType {
    Unknown = -1,
    TypeNone,
    TypeMultiply,
    TypeAdd,
    TypeSubTexture,
}

impl From<i32> for ModelMaterialSpheremapTextureType {
    fn from(v: i32) -> Self {
        match v {
            0 => Self::TypeNone,
            1 => Self::TypeMultiply,
            2 => Self::TypeAdd,
            3 => Self::TypeSubTexture,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelMaterial {
    pub name_ja: String,
    pub name_en: String,
    pub diffuse_color: F128,
    pub diffuse_opacity: f32,
    pub specular_color: F128,
    pub specular_power: f32,
    pub ambient_color: F128,
    pub flags: ModelMaterialFlags,
    pub edge_color: F128,
    pub edge_opacity: f32,
    pub edge_size: f32,
    pub diffuse_texture_index: i32,
    pub sphere_map_texture_index: i32,
    pub sphere_map_texture_type: ModelMaterialSpheremapTextureType,
    pub is_toon_shared: bool,
    pub toon_texture_index: i32,
    pub clob: String,
    pub num_vertex_indices: usize,
}

impl ModelMaterial {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelMaterial, ParseError> {
        let texture_index_size = parent_model.info.texture_index_size as usize;
        let name_ja = parent_model.get_string_pmx(buffer)?;
        let name_en = parent_model.get_string_pmx(buffer)?;
        let diffuse_color = buffer.read_f32_3_little_endian()?;
        let diffuse_opacity = buffer.read_f32_little_endian()?;
        let specular_color = buffer.read_f32_3_little_endian()?;
        let specular_power = buffer.read_f32_little_endian()?;
        let ambient_color = buffer.read_f32_3_little_endian()?;
        let mut flags = ModelMaterialFlags::from_u8(buffer.read_byte()?);
        if flags.is_point_draw_enabled {
            flags.is_casting_shadow_enabled = false;
            flags.is_casting_shadow_map_enabled = false;
            flags.is_shadow_map_enabled = false;
        } else if flags.is_line_draw_enabled {
            flags.is_edge_enabled = false;
        }
        let edge_color = buffer.read_f32_3_little_endian()?;
        let edge_opacity = buffer.read_f32_little_endian()?;
        let edge_size = buffer.read_f32_little_endian()?;
        let diffuse_texture_index = buffer.read_integer(texture_index_size)?;
        let sphere_map_texture_index = buffer.read_integer(texture_index_size)?;
        // 0xff is a legacy "no sphere map" byte still present in old exports
        let sphere_map_texture_type_raw = buffer.read_byte()?;
        let sphere_map_texture_type = if sphere_map_texture_type_raw == 0xffu8 {
            ModelMaterialSpheremapTextureType::TypeNone
        } else {
            ModelMaterialSpheremapTextureType::from(sphere_map_texture_type_raw as i32)
        };
        check(
            sphere_map_texture_type != ModelMaterialSpheremapTextureType::Unknown,
            ParseError::MaterialCorrupted,
        )?;
        let is_toon_shared = match buffer.read_byte()? {
            0u8 => false,
            1u8 => true,
            _ => return Err(ParseError::MaterialCorrupted),
        };
        let toon_texture_index = if is_toon_shared {
            buffer.read_byte()? as i32
        } else {
            buffer.read_integer(texture_index_size)?
        };
        let clob = parent_model.get_string_pmx(buffer)?;
        let num_vertex_indices = buffer.read_i32_little_endian()? as usize;
        Ok(ModelMaterial {
            name_ja,
            name_en,
            diffuse_color,
            diffuse_opacity,
            specular_color,
            specular_power,
            ambient_color,
            flags,
            edge_color,
            edge_opacity,
            edge_size,
            diffuse_texture_index,
            sphere_map_texture_index,
            sphere_map_texture_type,
            is_toon_shared,
            toon_texture_index,
            clob,
            num_vertex_indices,
        })
    }
}

/// Bit layout of the bone flag word:
/// bit 0  has_destination_bone_index
/// bit 1  is_rotatable
/// bit 2  is_movable
/// bit 3  is_visible
/// bit 4  is_user_handleable
/// bit 5  has_constraint
/// bit 6  (padding)
/// bit 7  has_local_inherent
/// bit 8  has_inherent_orientation
/// bit 9  has_inherent_translation
/// bit 10 has_fixed_axis
/// bit 11 has_local_axes
/// bit 12 is_affected_by_physics_simulation
/// bit 13 has_external_parent_bone
#[derive(Default, Clone, Copy, Debug)]
pub struct ModelBoneFlags {
    pub has_destination_bone_index: bool,
    pub is_rotatable: bool,
    pub is_movable: bool,
    pub is_visible: bool,
    pub is_user_handleable: bool,
    pub has_constraint: bool,
    pub has_local_inherent: bool,
    pub has_inherent_orientation: bool,
    pub has_inherent_translation: bool,
    pub has_fixed_axis: bool,
    pub has_local_axes: bool,
    pub is_affected_by_physics_simulation: bool,
    pub has_external_parent_bone: bool,
}

impl ModelBoneFlags {
    fn from_raw(u: u16) -> ModelBoneFlags {
        ModelBoneFlags {
            has_destination_bone_index: u % 2 != 0,
            is_rotatable: (u / 2) % 2 != 0,
            is_movable: (u / 4) % 2 != 0,
            is_visible: (u / 8) % 2 != 0,
            is_user_handleable: (u / 16) % 2 != 0,
            has_constraint: (u / 32) % 2 != 0,
            has_local_inherent: (u / 128) % 2 != 0,
            has_inherent_orientation: (u / 256) % 2 != 0,
            has_inherent_translation: (u / 512) % 2 != 0,
            has_fixed_axis: (u / 1024) % 2 != 0,
            has_local_axes: (u / 2048) % 2 != 0,
            is_affected_by_physics_simulation: (u / 4096) % 2 != 0,
            has_external_parent_bone: (u / 8192) % 2 != 0,
        }
    }
}

#[test]
fn test_model_bone_flags_from_value() {
    let f = ModelBoneFlags::from_raw(33);
    assert!(f.has_destination_bone_index);
    assert!(f.has_constraint);
    assert!(!f.has_inherent_translation);
}

/// Where the bone points: either a connected bone or a raw offset from the
/// bone origin. The destination flag bit selects which; never both.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ModelBoneDestinationU {
    BONE(i32),
    ORIGIN(F128),
}

#[derive(Clone, Debug)]
pub struct ModelBone {
    pub name_ja: String,
    pub name_en: String,
    pub origin: F128,
    pub parent_bone_index: i32,
    pub stage_index: i32,
    pub flags: ModelBoneFlags,
    pub destination: ModelBoneDestinationU,
    pub parent_inherent_bone_index: i32,
    pub inherent_coefficient: f32,
    pub fixed_axis: F128,
    pub local_x_axis: F128,
    pub local_z_axis: F128,
    pub global_bone_index: i32,
    pub constraint: Option<Box<ModelConstraint>>,
}

impl ModelBone {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelBone, ParseError> {
        let bone_index_size = parent_model.info.bone_index_size as usize;
        let name_ja = parent_model.get_string_pmx(buffer)?;
        let name_en = parent_model.get_string_pmx(buffer)?;
        let origin = buffer.read_f32_3_little_endian()?;
        let parent_bone_index = buffer.read_integer(bone_index_size)?;
        let stage_index = buffer.read_i32_little_endian()?;
        let flags = ModelBoneFlags::from_raw(buffer.read_u16_little_endian()?);
        let destination = if flags.has_destination_bone_index {
            ModelBoneDestinationU::BONE(buffer.read_integer(bone_index_size)?)
        } else {
            ModelBoneDestinationU::ORIGIN(buffer.read_f32_3_little_endian()?)
        };
        let mut bone = ModelBone {
            name_ja,
            name_en,
            origin,
            parent_bone_index,
            stage_index,
            flags,
            destination,
            parent_inherent_bone_index: -1,
            inherent_coefficient: 1.0f32,
            fixed_axis: F128::default(),
            local_x_axis: F128([1.0f32, 0.0f32, 0.0f32, 0.0f32]),
            local_z_axis: F128([0.0f32, 0.0f32, 1.0f32, 0.0f32]),
            global_bone_index: 0,
            constraint: None,
        };
        if bone.flags.has_inherent_orientation || bone.flags.has_inherent_translation {
            bone.parent_inherent_bone_index = buffer.read_integer(bone_index_size)?;
            bone.inherent_coefficient = buffer.read_f32_little_endian()?;
        }
        if bone.flags.has_fixed_axis {
            bone.fixed_axis = buffer.read_f32_3_little_endian()?;
        }
        if bone.flags.has_local_axes {
            bone.local_x_axis = buffer.read_f32_3_little_endian()?;
            bone.local_z_axis = buffer.read_f32_3_little_endian()?;
        }
        if bone.flags.has_external_parent_bone {
            bone.global_bone_index = buffer.read_i32_little_endian()?;
        }
        if bone.flags.has_constraint {
            bone.constraint = Some(Box::new(ModelConstraint::parse_pmx(parent_model, buffer)?));
        }
        Ok(bone)
    }
}

#[derive(Clone, Debug)]
pub struct ModelConstraintJoint {
    pub bone_index: i32,
    pub has_angle_limit: bool,
    pub lower_limit: F128,
    pub upper_limit: F128,
}

#[derive(Clone, Debug)]
pub struct ModelConstraint {
    pub effector_bone_index: i32,
    pub target_bone_index: i32,
    pub num_iterations: i32,
    pub angle_limit: f32,
    pub joints: Vec<ModelConstraintJoint>,
}

impl ModelConstraint {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelConstraint, ParseError> {
        let bone_index_size = parent_model.info.bone_index_size as usize;
        let mut constraint = ModelConstraint {
            effector_bone_index: buffer.read_integer(bone_index_size)?,
            target_bone_index: -1,
            num_iterations: buffer.read_i32_little_endian()?,
            angle_limit: buffer.read_f32_little_endian()?,
            joints: vec![],
        };
        let num_joints = buffer.read_len()?;
        for _ in 0..num_joints {
            let mut joint = ModelConstraintJoint {
                bone_index: buffer.read_integer(bone_index_size)?,
                has_angle_limit: match buffer.read_byte()? {
                    0u8 => false,
                    1u8 => true,
                    _ => return Err(ParseError::ConstraintCorrupted),
                },
                lower_limit: F128::default(),
                upper_limit: F128::default(),
            };
            if joint.has_angle_limit {
                joint.lower_limit = buffer.read_f32_3_little_endian()?;
                joint.upper_limit = buffer.read_f32_3_little_endian()?;
            }
            constraint.joints.push(joint);
        }
        Ok(constraint)
    }
}

#[derive(Clone, Debug)]
pub struct ModelMorphBone {
    pub bone_index: i32,
    pub translation: F128,
    pub orientation: F128,
}

impl ModelMorphBone {
    fn parse_pmx(
        bone_index_size: usize,
        buffer: &mut Buffer,
    ) -> Result<Vec<ModelMorphBone>, ParseError> {
        let num_objects = buffer.read_len()?;
        let mut vec = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            vec.push(ModelMorphBone {
                bone_index: buffer.read_integer(bone_index_size)?,
                translation: buffer.read_f32_3_little_endian()?,
                orientation: buffer.read_f32_4_little_endian()?,
            });
        }
        Ok(vec)
    }
}

#[derive(Clone, Debug)]
pub struct ModelMorphGroup {
    pub morph_index: i32,
    pub weight: f32,
}

impl ModelMorphGroup {
    fn parse_pmx(
        morph_index_size: usize,
        buffer: &mut Buffer,
    ) -> Result<Vec<ModelMorphGroup>, ParseError> {
        let num_objects = buffer.read_len()?;
        let mut vec = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            vec.push(ModelMorphGroup {
                morph_index: buffer.read_integer(morph_index_size)?,
                weight: buffer.read_f32_little_endian()?,
            });
        }
        Ok(vec)
    }
}

#[derive(Clone, Debug)]
pub struct ModelMorphFlip {
    pub morph_index: i32,
    pub weight: f32,
}

impl ModelMorphFlip {
    fn parse_pmx(
        morph_index_size: usize,
        buffer: &mut Buffer,
    ) -> Result<Vec<ModelMorphFlip>, ParseError> {
        let num_objects = buffer.read_len()?;
        let mut vec = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            vec.push(ModelMorphFlip {
                morph_index: buffer.read_integer(morph_index_size)?,
                weight: buffer.read_f32_little_endian()?,
            });
        }
        Ok(vec)
    }
}

#[derive(Clone, Debug)]
pub struct ModelMorphImpulse {
    pub rigid_body_index: i32,
    pub is_local: bool,
    pub velocity: F128,
    pub torque: F128,
}

impl ModelMorphImpulse {
    fn parse_pmx(
        rigid_body_index_size: usize,
        buffer: &mut Buffer,
    ) -> Result<Vec<ModelMorphImpulse>, ParseError> {
        let num_objects = buffer.read_len()?;
        let mut vec = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            vec.push(ModelMorphImpulse {
                rigid_body_index: buffer.read_integer(rigid_body_index_size)?,
                is_local: buffer.read_byte()? != 0,
                velocity: buffer.read_f32_3_little_endian()?,
                torque: buffer.read_f32_3_little_endian()?,
            });
        }
        Ok(vec)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelMorphMaterialOperationType {
    Unknown = -1,
    Multiply,
    Add,
}

impl From<u8> for ModelMorphMaterialOperationType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModelMorphMaterialOperationType::Multiply,
            1 => ModelMorphMaterialOperationType::Add,
            _ => ModelMorphMaterialOperationType::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelMorphMaterial {
    pub material_index: i32,
    pub operation: ModelMorphMaterialOperationType,
    pub diffuse_color: F128,
    pub diffuse_opacity: f32,
    pub specular_color: F128,
    pub specular_power: f32,
    pub ambient_color: F128,
    pub edge_color: F128,
    pub edge_opacity: f32,
    pub edge_size: f32,
    pub diffuse_texture_blend: F128,
    pub sphere_map_texture_blend: F128,
    pub toon_texture_blend: F128,
}

impl ModelMorphMaterial {
    fn parse_pmx(
        material_index_size: usize,
        buffer: &mut Buffer,
    ) -> Result<Vec<ModelMorphMaterial>, ParseError> {
        let num_objects = buffer.read_len()?;
        let mut vec = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            let material_index = buffer.read_integer(material_index_size)?;
            let operation = ModelMorphMaterialOperationType::from(buffer.read_byte()?);
            check(
                operation != ModelMorphMaterialOperationType::Unknown,
                ParseError::MorphCorrupted,
            )?;
            vec.push(ModelMorphMaterial {
                material_index,
                operation,
                diffuse_color: buffer.read_f32_3_little_endian()?,
                diffuse_opacity: buffer.read_f32_little_endian()?,
                specular_color: buffer.read_f32_3_little_endian()?,
                specular_power: buffer.read_f32_little_endian()?,
                ambient_color: buffer.read_f32_3_little_endian()?,
                edge_color: buffer.read_f32_3_little_endian()?,
                edge_opacity: buffer.read_f32_little_endian()?,
                edge_size: buffer.read_f32_little_endian()?,
                diffuse_texture_blend: buffer.read_f32_4_little_endian()?,
                sphere_map_texture_blend: buffer.read_f32_4_little_endian()?,
                toon_texture_blend: buffer.read_f32_4_little_endian()?,
            });
        }
        Ok(vec)
    }
}

#[derive(Clone, Debug)]
pub struct ModelMorphUv {
    pub vertex_index: i32,
    pub position: F128,
}

impl ModelMorphUv {
    fn parse_pmx(
        vertex_index_size: usize,
        buffer: &mut Buffer,
    ) -> Result<Vec<ModelMorphUv>, ParseError> {
        let num_objects = buffer.read_len()?;
        let mut vec = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            vec.push(ModelMorphUv {
                vertex_index: buffer.read_integer(vertex_index_size)?,
                position: buffer.read_f32_4_little_endian()?,
            });
        }
        Ok(vec)
    }
}

#[derive(Clone, Debug)]
pub struct ModelMorphVertex {
    pub vertex_index: i32,
    pub position: F128,
}

impl ModelMorphVertex {
    fn parse_pmx(
        vertex_index_size: usize,
        buffer: &mut Buffer,
    ) -> Result<Vec<ModelMorphVertex>, ParseError> {
        let num_objects = buffer.read_len()?;
        let mut vec = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            vec.push(ModelMorphVertex {
                vertex_index: buffer.read_integer(vertex_index_size)?,
                position: buffer.read_f32_3_little_endian()?,
            });
        }
        Ok(vec)
    }
}

/// Morph element payload; the morph type tag selects exactly one shape, so
/// a morph can never carry elements of two kinds at once.
#[derive(Clone, Debug)]
pub enum ModelMorphU {
    GROUPS(Vec<ModelMorphGroup>),
    VERTICES(Vec<ModelMorphVertex>),
    BONES(Vec<ModelMorphBone>),
    UVS(Vec<ModelMorphUv>),
    MATERIALS(Vec<ModelMorphMaterial>),
    FLIPS(Vec<ModelMorphFlip>),
    IMPULSES(Vec<ModelMorphImpulse>),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelMorphCategory {
    Unknown = -1,
    Base,
    Eyebrow,
    Eye,
    Lip,
    Other,
}

impl From<u8> for ModelMorphCategory {
    fn from(value: u8) -> Self {
        match value {
            0 => ModelMorphCategory::Base,
            1 => ModelMorphCategory::Eyebrow,
            2 => ModelMorphCategory::Eye,
            3 => ModelMorphCategory::Lip,
            4 => ModelMorphCategory::Other,
            _ => ModelMorphCategory::Unknown,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelMorphType {
    Unknown = -1,
    Group,
    Vertex,
    Bone,
    Texture,
    Uva1,
    Uva2,
    Uva3,
    Uva4,
    Material,
    Flip,
    Impulse,
}

impl From<u8> for ModelMorphType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModelMorphType::Group,
            1 => ModelMorphType::Vertex,
            2 => ModelMorphType::Bone,
            3 => ModelMorphType::Texture,
            4 => ModelMorphType::Uva1,
            5 => ModelMorphType::Uva2,
            6 => ModelMorphType::Uva3,
            7 => ModelMorphType::Uva4,
            8 => ModelMorphType::Material,
            9 => ModelMorphType::Flip,
            10 => ModelMorphType::Impulse,
            _ => ModelMorphType::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelMorph {
    pub name_ja: String,
    pub name_en: String,
    pub category: ModelMorphCategory,
    pub typ: ModelMorphType,
    pub u: ModelMorphU,
}

impl ModelMorph {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelMorph, ParseError> {
        let name_ja = parent_model.get_string_pmx(buffer)?;
        let name_en = parent_model.get_string_pmx(buffer)?;
        let category = ModelMorphCategory::from(buffer.read_byte()?);
        check(
            category != ModelMorphCategory::Unknown,
            ParseError::MorphCorrupted,
        )?;
        let typ = ModelMorphType::from(buffer.read_byte()?);
        let u = match typ {
            ModelMorphType::Unknown => return Err(ParseError::MorphCorrupted),
            ModelMorphType::Group => ModelMorphU::GROUPS(ModelMorphGroup::parse_pmx(
                parent_model.info.morph_index_size as usize,
                buffer,
            )?),
            ModelMorphType::Vertex => ModelMorphU::VERTICES(ModelMorphVertex::parse_pmx(
                parent_model.info.vertex_index_size as usize,
                buffer,
            )?),
            ModelMorphType::Bone => ModelMorphU::BONES(ModelMorphBone::parse_pmx(
                parent_model.info.bone_index_size as usize,
                buffer,
            )?),
            ModelMorphType::Texture
            | ModelMorphType::Uva1
            | ModelMorphType::Uva2
            | ModelMorphType::Uva3
            | ModelMorphType::Uva4 => ModelMorphU::UVS(ModelMorphUv::parse_pmx(
                parent_model.info.vertex_index_size as usize,
                buffer,
            )?),
            ModelMorphType::Material => ModelMorphU::MATERIALS(ModelMorphMaterial::parse_pmx(
                parent_model.info.material_index_size as usize,
                buffer,
            )?),
            ModelMorphType::Flip => {
                check(
                    parent_model.get_format_type() == ModelFormatType::Pmx2_1,
                    ParseError::MorphCorrupted,
                )?;
                ModelMorphU::FLIPS(ModelMorphFlip::parse_pmx(
                    parent_model.info.morph_index_size as usize,
                    buffer,
                )?)
            }
            ModelMorphType::Impulse => {
                check(
                    parent_model.get_format_type() == ModelFormatType::Pmx2_1,
                    ParseError::MorphCorrupted,
                )?;
                ModelMorphU::IMPULSES(ModelMorphImpulse::parse_pmx(
                    parent_model.info.rigid_body_index_size as usize,
                    buffer,
                )?)
            }
        };
        Ok(ModelMorph {
            name_ja,
            name_en,
            category,
            typ,
            u,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ModelLabelItemType {
    Unknown = -1,
    Bone,
    Morph,
}

impl From<u8> for ModelLabelItemType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModelLabelItemType::Bone,
            1 => ModelLabelItemType::Morph,
            _ => ModelLabelItemType::Unknown,
        }
    }
}

/// One display-frame entry; the tag byte selects which index category (and
/// so which index width) the entry refers to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelLabelItem {
    BONE(i32),
    MORPH(i32),
}

#[derive(Clone, Debug)]
pub struct ModelLabel {
    pub name_ja: String,
    pub name_en: String,
    pub is_special: bool,
    pub items: Vec<ModelLabelItem>,
}

impl ModelLabel {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelLabel, ParseError> {
        let bone_index_size = parent_model.info.bone_index_size as usize;
        let morph_index_size = parent_model.info.morph_index_size as usize;
        let mut label = ModelLabel {
            name_ja: parent_model.get_string_pmx(buffer)?,
            name_en: parent_model.get_string_pmx(buffer)?,
            is_special: buffer.read_byte()? != 0,
            items: vec![],
        };
        let num_items = buffer.read_len()?;
        for _ in 0..num_items {
            match ModelLabelItemType::from(buffer.read_byte()?) {
                ModelLabelItemType::Bone => label
                    .items
                    .push(ModelLabelItem::BONE(buffer.read_integer(bone_index_size)?)),
                ModelLabelItemType::Morph => label
                    .items
                    .push(ModelLabelItem::MORPH(buffer.read_integer(morph_index_size)?)),
                ModelLabelItemType::Unknown => return Err(ParseError::LabelCorrupted),
            }
        }
        Ok(label)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelRigidBodyShapeType {
    Unknown = -1,
    Sphere,
    Box,
    Capsule,
}

impl From<u8> for ModelRigidBodyShapeType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModelRigidBodyShapeType::Sphere,
            1 => ModelRigidBodyShapeType::Box,
            2 => ModelRigidBodyShapeType::Capsule,
            _ => ModelRigidBodyShapeType::Unknown,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelRigidBodyTransformType {
    Unknown = -1,
    FromBoneToSimulation,
    FromSimulationToBone,
    FromBoneOrientationAndSimulationToBone,
}

impl From<u8> for ModelRigidBodyTransformType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModelRigidBodyTransformType::FromBoneToSimulation,
            1 => ModelRigidBodyTransformType::FromSimulationToBone,
            2 => ModelRigidBodyTransformType::FromBoneOrientationAndSimulationToBone,
            _ => ModelRigidBodyTransformType::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelRigidBody {
    pub name_ja: String,
    pub name_en: String,
    pub bone_index: i32,
    pub collision_group_id: i32,
    pub collision_mask: i32,
    pub shape_type: ModelRigidBodyShapeType,
    pub size: F128,
    pub origin: F128,
    pub orientation: F128,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    pub friction: f32,
    pub transform_type: ModelRigidBodyTransformType,
}

impl ModelRigidBody {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelRigidBody, ParseError> {
        let name_ja = parent_model.get_string_pmx(buffer)?;
        let name_en = parent_model.get_string_pmx(buffer)?;
        let bone_index =
            buffer.read_integer(parent_model.info.bone_index_size as usize)?;
        let collision_group_id = buffer.read_byte()? as i32;
        let collision_mask = buffer.read_i16_little_endian()? as i32;
        let shape_type = ModelRigidBodyShapeType::from(buffer.read_byte()?);
        check(
            shape_type != ModelRigidBodyShapeType::Unknown,
            ParseError::RigidBodyCorrupted,
        )?;
        let size = buffer.read_f32_3_little_endian()?;
        let origin = buffer.read_f32_3_little_endian()?;
        let orientation = buffer.read_f32_3_little_endian()?;
        let mass = buffer.read_f32_little_endian()?;
        let linear_damping = buffer.read_f32_little_endian()?;
        let angular_damping = buffer.read_f32_little_endian()?;
        let restitution = buffer.read_f32_little_endian()?;
        let friction = buffer.read_f32_little_endian()?;
        let transform_type = ModelRigidBodyTransformType::from(buffer.read_byte()?);
        check(
            transform_type != ModelRigidBodyTransformType::Unknown,
            ParseError::RigidBodyCorrupted,
        )?;
        Ok(ModelRigidBody {
            name_ja,
            name_en,
            bone_index,
            collision_group_id,
            collision_mask,
            shape_type,
            size,
            origin,
            orientation,
            mass,
            linear_damping,
            angular_damping,
            restitution,
            friction,
            transform_type,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelJointType {
    Unknown = -1,
    Generic6dofSpringConstraint,
    Generic6dofConstraint,
    Point2pointConstraint,
    ConeTwistConstraint,
    SliderConstraint,
    HingeConstraint,
}

impl From<u8> for ModelJointType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModelJointType::Generic6dofSpringConstraint,
            1 => ModelJointType::Generic6dofConstraint,
            2 => ModelJointType::Point2pointConstraint,
            3 => ModelJointType::ConeTwistConstraint,
            4 => ModelJointType::SliderConstraint,
            5 => ModelJointType::HingeConstraint,
            _ => ModelJointType::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelJoint {
    pub name_ja: String,
    pub name_en: String,
    pub typ: ModelJointType,
    pub rigid_body_a_index: i32,
    pub rigid_body_b_index: i32,
    pub origin: F128,
    pub orientation: F128,
    pub linear_lower_limit: F128,
    pub linear_upper_limit: F128,
    pub angular_lower_limit: F128,
    pub angular_upper_limit: F128,
    pub linear_stiffness: F128,
    pub angular_stiffness: F128,
}

impl ModelJoint {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelJoint, ParseError> {
        let rigid_body_index_size = parent_model.info.rigid_body_index_size as usize;
        let name_ja = parent_model.get_string_pmx(buffer)?;
        let name_en = parent_model.get_string_pmx(buffer)?;
        let typ = ModelJointType::from(buffer.read_byte()?);
        check(typ != ModelJointType::Unknown, ParseError::JointCorrupted)?;
        Ok(ModelJoint {
            name_ja,
            name_en,
            typ,
            rigid_body_a_index: buffer.read_integer(rigid_body_index_size)?,
            rigid_body_b_index: buffer.read_integer(rigid_body_index_size)?,
            origin: buffer.read_f32_3_little_endian()?,
            orientation: buffer.read_f32_3_little_endian()?,
            linear_lower_limit: buffer.read_f32_3_little_endian()?,
            linear_upper_limit: buffer.read_f32_3_little_endian()?,
            angular_lower_limit: buffer.read_f32_3_little_endian()?,
            angular_upper_limit: buffer.read_f32_3_little_endian()?,
            linear_stiffness: buffer.read_f32_3_little_endian()?,
            angular_stiffness: buffer.read_f32_3_little_endian()?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelSoftBodyShapeType {
    Unknown = -1,
    TriMesh,
    Rope,
}

impl From<u8> for ModelSoftBodyShapeType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModelSoftBodyShapeType::TriMesh,
            1 => ModelSoftBodyShapeType::Rope,
            _ => ModelSoftBodyShapeType::Unknown,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModelSoftBodyAeroModelType {
    Unknown = -1,
    VertexPoint,
    VertexTwoSided,
    VertexOneSided,
    FaceTwoSided,
    FaceOneSided,
}

impl From<i32> for ModelSoftBodyAeroModelType {
    fn from(value: i32) -> Self {
        match value {
            0 => ModelSoftBodyAeroModelType::VertexPoint,
            1 => ModelSoftBodyAeroModelType::VertexTwoSided,
            2 => ModelSoftBodyAeroModelType::VertexOneSided,
            3 => ModelSoftBodyAeroModelType::FaceTwoSided,
            4 => ModelSoftBodyAeroModelType::FaceOneSided,
            _ => ModelSoftBodyAeroModelType::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelSoftBodyAnchor {
    pub rigid_body_index: i32,
    pub vertex_index: i32,
    pub is_near_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct ModelSoftBody {
    pub name_ja: String,
    pub name_en: String,
    pub shape_type: ModelSoftBodyShapeType,
    pub material_index: i32,
    pub collision_group_id: u8,
    pub collision_mask: u16,
    pub flags: u8,
    pub bending_constraints_distance: i32,
    pub cluster_count: i32,
    pub total_mass: f32,
    pub collision_margin: f32,
    pub aero_model: ModelSoftBodyAeroModelType,
    pub velocity_correction_factor: f32,
    pub damping_coefficient: f32,
    pub drag_coefficient: f32,
    pub lift_coefficient: f32,
    pub pressure_coefficient: f32,
    pub volume_conservation_coefficient: f32,
    pub dynamic_friction_coefficient: f32,
    pub pose_matching_coefficient: f32,
    pub rigid_contact_hardness: f32,
    pub kinetic_contact_hardness: f32,
    pub soft_contact_hardness: f32,
    pub anchor_hardness: f32,
    pub soft_vs_rigid_hardness: f32,
    pub soft_vs_kinetic_hardness: f32,
    pub soft_vs_soft_hardness: f32,
    pub soft_vs_rigid_impulse_split: f32,
    pub soft_vs_kinetic_impulse_split: f32,
    pub soft_vs_soft_impulse_split: f32,
    pub velocity_solver_iterations: i32,
    pub positions_solver_iterations: i32,
    pub drift_solver_iterations: i32,
    pub cluster_solver_iterations: i32,
    pub linear_stiffness_coefficient: f32,
    pub angular_stiffness_coefficient: f32,
    pub volume_stiffness_coefficient: f32,
    pub anchors: Vec<ModelSoftBodyAnchor>,
    pub pinned_vertex_indices: Vec<i32>,
}

impl ModelSoftBody {
    fn parse_pmx(parent_model: &Model, buffer: &mut Buffer) -> Result<ModelSoftBody, ParseError> {
        let material_index_size = parent_model.info.material_index_size as usize;
        let rigid_body_index_size = parent_model.info.rigid_body_index_size as usize;
        let vertex_index_size = parent_model.info.vertex_index_size as usize;
        let name_ja = parent_model.get_string_pmx(buffer)?;
        let name_en = parent_model.get_string_pmx(buffer)?;
        let shape_type = ModelSoftBodyShapeType::from(buffer.read_byte()?);
        check(
            shape_type != ModelSoftBodyShapeType::Unknown,
            ParseError::SoftBodyCorrupted,
        )?;
        let material_index = buffer.read_integer(material_index_size)?;
        let collision_group_id = buffer.read_byte()?;
        let collision_mask = buffer.read_u16_little_endian()?;
        let flags = buffer.read_byte()?;
        let bending_constraints_distance = buffer.read_i32_little_endian()?;
        let cluster_count = buffer.read_i32_little_endian()?;
        let total_mass = buffer.read_f32_little_endian()?;
        let collision_margin = buffer.read_f32_little_endian()?;
        let aero_model = ModelSoftBodyAeroModelType::from(buffer.read_i32_little_endian()?);
        check(
            aero_model != ModelSoftBodyAeroModelType::Unknown,
            ParseError::SoftBodyCorrupted,
        )?;
        let mut soft_body = ModelSoftBody {
            name_ja,
            name_en,
            shape_type,
            material_index,
            collision_group_id,
            collision_mask,
            flags,
            bending_constraints_distance,
            cluster_count,
            total_mass,
            collision_margin,
            aero_model,
            velocity_correction_factor: buffer.read_f32_little_endian()?,
            damping_coefficient: buffer.read_f32_little_endian()?,
            drag_coefficient: buffer.read_f32_little_endian()?,
            lift_coefficient: buffer.read_f32_little_endian()?,
            pressure_coefficient: buffer.read_f32_little_endian()?,
            volume_conservation_coefficient: buffer.read_f32_little_endian()?,
            dynamic_friction_coefficient: buffer.read_f32_little_endian()?,
            pose_matching_coefficient: buffer.read_f32_little_endian()?,
            rigid_contact_hardness: buffer.read_f32_little_endian()?,
            kinetic_contact_hardness: buffer.read_f32_little_endian()?,
            soft_contact_hardness: buffer.read_f32_little_endian()?,
            anchor_hardness: buffer.read_f32_little_endian()?,
            soft_vs_rigid_hardness: buffer.read_f32_little_endian()?,
            soft_vs_kinetic_hardness: buffer.read_f32_little_endian()?,
            soft_vs_soft_hardness: buffer.read_f32_little_endian()?,
            soft_vs_rigid_impulse_split: buffer.read_f32_little_endian()?,
            soft_vs_kinetic_impulse_split: buffer.read_f32_little_endian()?,
            soft_vs_soft_impulse_split: buffer.read_f32_little_endian()?,
            velocity_solver_iterations: buffer.read_i32_little_endian()?,
            positions_solver_iterations: buffer.read_i32_little_endian()?,
            drift_solver_iterations: buffer.read_i32_little_endian()?,
            cluster_solver_iterations: buffer.read_i32_little_endian()?,
            linear_stiffness_coefficient: buffer.read_f32_little_endian()?,
            angular_stiffness_coefficient: buffer.read_f32_little_endian()?,
            volume_stiffness_coefficient: buffer.read_f32_little_endian()?,
            anchors: vec![],
            pinned_vertex_indices: vec![],
        };
        let num_anchors = buffer.read_len()?;
        for _ in 0..num_anchors {
            soft_body.anchors.push(ModelSoftBodyAnchor {
                rigid_body_index: buffer.read_integer(rigid_body_index_size)?,
                vertex_index: buffer.read_integer(vertex_index_size)?,
                is_near_enabled: buffer.read_byte()? != 0,
            });
        }
        let num_pin_vertex_indices = buffer.read_len()?;
        for _ in 0..num_pin_vertex_indices {
            soft_body
                .pinned_vertex_indices
                .push(buffer.read_integer(vertex_index_size)?);
        }
        Ok(soft_body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODING_UTF8: u8 = 1;

    fn push_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_i32(buf: &mut Vec<u8>, v: i32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_f32(buf: &mut Vec<u8>, v: f32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_f32_n(buf: &mut Vec<u8>, vs: &[f32]) {
        for v in vs {
            push_f32(buf, *v);
        }
    }

    fn push_text(buf: &mut Vec<u8>, s: &str) {
        push_i32(buf, s.len() as i32);
        buf.extend_from_slice(s.as_bytes());
    }

    /// Signature, version, config block (UTF-8, all index widths 1) and an
    /// empty model-info block.
    fn prologue(version: f32, additional_uv_size: u8) -> Vec<u8> {
        let mut buf = vec![b'P', b'M', b'X', b' '];
        push_f32(&mut buf, version);
        buf.push(8);
        buf.extend_from_slice(&[ENCODING_UTF8, additional_uv_size, 1, 1, 1, 1, 1, 1]);
        for _ in 0..4 {
            push_i32(&mut buf, 0);
        }
        buf
    }

    fn close_sections(buf: &mut Vec<u8>, count: usize) {
        for _ in 0..count {
            push_i32(buf, 0);
        }
    }

    /// position, normal, uv
    fn push_vertex_prefix(buf: &mut Vec<u8>) {
        push_f32_n(buf, &[1.0, 2.0, 3.0]);
        push_f32_n(buf, &[0.0, 1.0, 0.0]);
        push_f32_n(buf, &[0.5, 0.5]);
    }

    fn parse(bytes: Vec<u8>) -> Result<Model, ParseError> {
        Model::from_bytes(bytes)
    }

    #[test]
    fn test_empty_model_v20() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 9);
        let mut buffer = Buffer::create(bytes);
        let model = Model::load_from_buffer(&mut buffer).unwrap();
        assert!(buffer.is_end());
        assert_eq!(ModelFormatType::Pmx2_0, model.get_format_type());
        assert_eq!(CodecType::Utf8, model.get_codec_type());
        assert_eq!(0, model.get_additional_uv_size());
        assert!(model.get_all_vertex_objects().is_empty());
        assert!(model.get_all_soft_body_objects().is_empty());
    }

    #[test]
    fn test_model_info_strings() {
        let mut bytes = vec![b'P', b'M', b'X', b' '];
        push_f32(&mut bytes, 2.0);
        bytes.push(8);
        bytes.extend_from_slice(&[ENCODING_UTF8, 0, 1, 1, 1, 1, 1, 1]);
        push_text(&mut bytes, "初音ミク");
        push_text(&mut bytes, "Miku");
        push_text(&mut bytes, "コメント");
        push_text(&mut bytes, "comment");
        close_sections(&mut bytes, 9);
        let model = parse(bytes).unwrap();
        assert_eq!("初音ミク", model.get_name(LanguageType::Japanese));
        assert_eq!("Miku", model.get_name(LanguageType::English));
        assert_eq!("コメント", model.get_comment(LanguageType::Japanese));
        assert_eq!("comment", model.get_comment(LanguageType::English));
    }

    #[test]
    fn test_invalid_signature_rejected_before_anything_else() {
        let bytes = vec![0x50, 0x4d, 0x58, 0x21];
        assert_eq!(ParseError::InvalidSignature, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = vec![b'P', b'M', b'X', b' '];
        push_f32(&mut bytes, 1.0);
        bytes.push(8);
        bytes.extend_from_slice(&[ENCODING_UTF8, 0, 1, 1, 1, 1, 1, 1]);
        assert_eq!(ParseError::VersionIncompatible, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_header_info_domain_checks() {
        // encoding byte out of domain
        let mut bytes = vec![b'P', b'M', b'X', b' '];
        push_f32(&mut bytes, 2.0);
        bytes.push(8);
        bytes.extend_from_slice(&[2, 0, 1, 1, 1, 1, 1, 1]);
        assert_eq!(ParseError::InfoCorrupted, parse(bytes).unwrap_err());
        // additional uv count out of domain
        let mut bytes = vec![b'P', b'M', b'X', b' '];
        push_f32(&mut bytes, 2.0);
        bytes.push(8);
        bytes.extend_from_slice(&[ENCODING_UTF8, 5, 1, 1, 1, 1, 1, 1]);
        assert_eq!(ParseError::InfoCorrupted, parse(bytes).unwrap_err());
        // index width 3 is not a legal width
        let mut bytes = vec![b'P', b'M', b'X', b' '];
        push_f32(&mut bytes, 2.0);
        bytes.push(8);
        bytes.extend_from_slice(&[ENCODING_UTF8, 0, 3, 1, 1, 1, 1, 1]);
        assert_eq!(ParseError::InfoCorrupted, parse(bytes).unwrap_err());
        // config block length must be 8
        let mut bytes = vec![b'P', b'M', b'X', b' '];
        push_f32(&mut bytes, 2.0);
        bytes.push(7);
        bytes.extend_from_slice(&[ENCODING_UTF8, 0, 1, 1, 1, 1, 1]);
        assert_eq!(ParseError::InfoCorrupted, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_header_then_end_of_stream() {
        let mut bytes = vec![b'P', b'M', b'X', b' '];
        push_f32(&mut bytes, 2.0);
        bytes.push(8);
        bytes.extend_from_slice(&[ENCODING_UTF8, 0, 1, 1, 1, 1, 1, 1]);
        let err = parse(bytes).unwrap_err();
        assert_eq!(ParseError::BufferEnd, err);
        assert!(err.is_truncation());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 9);
        bytes.push(0);
        assert_eq!(ParseError::BufferNotEnd, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_vertex_bdef2_weight_complement() {
        let mut bytes = prologue(2.0, 0);
        push_i32(&mut bytes, 1);
        push_vertex_prefix(&mut bytes);
        bytes.push(1); // BDEF2
        bytes.push(0);
        bytes.push(1);
        push_f32(&mut bytes, 0.7);
        push_f32(&mut bytes, 1.0); // edge size
        close_sections(&mut bytes, 8);
        let model = parse(bytes).unwrap();
        let vertex = &model.get_all_vertex_objects()[0];
        assert_eq!(ModelVertexType::Bdef2, vertex.u.typ());
        match vertex.u {
            ModelVertexU::BDEF2 {
                bone_indices,
                bone_weights,
            } => {
                assert_eq!([0, 1], bone_indices);
                assert_eq!(0.7f32, bone_weights[0]);
                assert_eq!(1.0f32 - 0.7f32, bone_weights[1]);
            }
            _ => panic!("expected a BDEF2 payload"),
        }
        assert_eq!([1.0, 2.0, 3.0, 0.0], vertex.origin.0);
        assert_eq!(1.0, vertex.edge_size);
    }

    #[test]
    fn test_vertex_sdef_reads_three_vectors() {
        let mut bytes = prologue(2.0, 0);
        push_i32(&mut bytes, 1);
        push_vertex_prefix(&mut bytes);
        bytes.push(3); // SDEF
        bytes.push(2);
        bytes.push(5);
        push_f32(&mut bytes, 0.25);
        push_f32_n(&mut bytes, &[1.0, 1.0, 1.0]); // C
        push_f32_n(&mut bytes, &[2.0, 2.0, 2.0]); // R0
        push_f32_n(&mut bytes, &[3.0, 3.0, 3.0]); // R1
        push_f32(&mut bytes, 0.0);
        close_sections(&mut bytes, 8);
        let model = parse(bytes).unwrap();
        match model.get_all_vertex_objects()[0].u {
            ModelVertexU::SDEF {
                bone_indices,
                bone_weights,
                sdef_c,
                sdef_r0,
                sdef_r1,
            } => {
                assert_eq!([2, 5], bone_indices);
                assert_eq!(1.0f32 - 0.25f32, bone_weights[1]);
                assert_eq!([1.0, 1.0, 1.0, 1.0], sdef_c.0);
                assert_eq!([2.0, 2.0, 2.0, 1.0], sdef_r0.0);
                assert_eq!([3.0, 3.0, 3.0, 1.0], sdef_r1.0);
            }
            _ => panic!("expected an SDEF payload"),
        }
    }

    #[test]
    fn test_vertex_qdef_requires_v21() {
        let mut bytes = prologue(2.0, 0);
        push_i32(&mut bytes, 1);
        push_vertex_prefix(&mut bytes);
        bytes.push(4); // QDEF under 2.0
        assert_eq!(ParseError::VertexCorrupted, parse(bytes).unwrap_err());

        let mut bytes = prologue(2.1, 0);
        push_i32(&mut bytes, 1);
        push_vertex_prefix(&mut bytes);
        bytes.push(4);
        bytes.extend_from_slice(&[0, 1, 2, 3]);
        push_f32_n(&mut bytes, &[0.1, 0.2, 0.3, 0.4]);
        push_f32(&mut bytes, 0.0);
        close_sections(&mut bytes, 9);
        let model = parse(bytes).unwrap();
        assert!(matches!(
            model.get_all_vertex_objects()[0].u,
            ModelVertexU::QDEF { .. }
        ));
    }

    #[test]
    fn test_vertex_unknown_weight_type() {
        let mut bytes = prologue(2.0, 0);
        push_i32(&mut bytes, 1);
        push_vertex_prefix(&mut bytes);
        bytes.push(9);
        assert_eq!(ParseError::VertexCorrupted, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_vertex_additional_uv_channels() {
        let mut bytes = prologue(2.0, 2);
        push_i32(&mut bytes, 1);
        push_vertex_prefix(&mut bytes);
        push_f32_n(&mut bytes, &[1.0, 2.0, 3.0, 4.0]);
        push_f32_n(&mut bytes, &[5.0, 6.0, 7.0, 8.0]);
        bytes.push(0); // BDEF1
        bytes.push(0);
        push_f32(&mut bytes, 0.0);
        close_sections(&mut bytes, 8);
        let model = parse(bytes).unwrap();
        assert_eq!(2, model.get_additional_uv_size());
        let vertex = &model.get_all_vertex_objects()[0];
        assert_eq!([1.0, 2.0, 3.0, 4.0], vertex.additional_uv[0].0);
        assert_eq!([5.0, 6.0, 7.0, 8.0], vertex.additional_uv[1].0);
        assert_eq!([0.0; 4], vertex.additional_uv[2].0);
        assert_eq!([0.0; 4], vertex.additional_uv[3].0);
    }

    #[test]
    fn test_one_byte_index_sentinel() {
        let mut bytes = prologue(2.0, 0);
        push_i32(&mut bytes, 1);
        push_vertex_prefix(&mut bytes);
        bytes.push(0); // BDEF1
        bytes.push(0xff);
        push_f32(&mut bytes, 0.0);
        close_sections(&mut bytes, 8);
        let model = parse(bytes).unwrap();
        match model.get_all_vertex_objects()[0].u {
            ModelVertexU::BDEF1 { bone_index } => assert_eq!(-1, bone_index),
            _ => panic!("expected a BDEF1 payload"),
        }
    }

    #[test]
    fn test_surfaces_grouped_in_triangles() {
        let mut bytes = prologue(2.0, 0);
        push_i32(&mut bytes, 0); // vertices
        push_i32(&mut bytes, 6);
        bytes.extend_from_slice(&[0, 1, 2, 3, 4, 5]);
        close_sections(&mut bytes, 7);
        let model = parse(bytes).unwrap();
        let surfaces = model.get_all_surface_objects();
        assert_eq!(2, surfaces.len());
        assert_eq!([0, 1, 2], surfaces[0].vertex_indices);
        assert_eq!([3, 4, 5], surfaces[1].vertex_indices);
    }

    #[test]
    fn test_surface_count_not_divisible_by_three() {
        let mut bytes = prologue(2.0, 0);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 7);
        bytes.extend_from_slice(&[0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(ParseError::FaceCorrupted, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_texture_paths() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 2); // vertices, surfaces
        push_i32(&mut bytes, 2);
        push_text(&mut bytes, "tex/body.png");
        push_text(&mut bytes, "tex/face.png");
        close_sections(&mut bytes, 6);
        let model = parse(bytes).unwrap();
        let textures = model.get_all_texture_objects();
        assert_eq!("tex/body.png", textures[0].path);
        assert_eq!("tex/face.png", textures[1].path);
    }

    fn push_material_until_sphere_byte(buf: &mut Vec<u8>) {
        push_i32(buf, 0); // name
        push_i32(buf, 0); // name en
        push_f32_n(buf, &[1.0, 1.0, 1.0]); // diffuse
        push_f32(buf, 1.0); // opacity
        push_f32_n(buf, &[0.5, 0.5, 0.5]); // specular
        push_f32(buf, 5.0); // specular power
        push_f32_n(buf, &[0.2, 0.2, 0.2]); // ambient
        buf.push(0); // flags
        push_f32_n(buf, &[0.0, 0.0, 0.0]); // edge color
        push_f32(buf, 1.0); // edge opacity
        push_f32(buf, 1.0); // edge size
        buf.push(0xff); // diffuse texture: none
        buf.push(0xff); // sphere texture: none
    }

    #[test]
    fn test_material_shared_toon() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 3); // vertices, surfaces, textures
        push_i32(&mut bytes, 1);
        push_material_until_sphere_byte(&mut bytes);
        bytes.push(0xff); // legacy sphere byte reads as none
        bytes.push(1); // shared toon
        bytes.push(5); // shared toon slot
        push_i32(&mut bytes, 0); // clob
        push_i32(&mut bytes, 3); // surface index count
        close_sections(&mut bytes, 5);
        let model = parse(bytes).unwrap();
        let material = &model.get_all_material_objects()[0];
        assert!(material.is_toon_shared);
        assert_eq!(5, material.toon_texture_index);
        assert_eq!(-1, material.diffuse_texture_index);
        assert_eq!(
            ModelMaterialSpheremapTextureType::TypeNone,
            material.sphere_map_texture_type
        );
        assert_eq!(3, material.num_vertex_indices);
    }

    #[test]
    fn test_material_toon_mode_byte_must_be_boolean() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 3);
        push_i32(&mut bytes, 1);
        push_material_until_sphere_byte(&mut bytes);
        bytes.push(0);
        bytes.push(2); // neither 0 nor 1
        assert_eq!(ParseError::MaterialCorrupted, parse(bytes).unwrap_err());
    }

    fn push_bone_prefix(buf: &mut Vec<u8>, flags: u16) {
        push_i32(buf, 0); // name
        push_i32(buf, 0); // name en
        push_f32_n(buf, &[0.0, 1.0, 0.0]); // origin
        buf.push(0xff); // parent: none
        push_i32(buf, 0); // stage
        push_u16(buf, flags);
    }

    #[test]
    fn test_bone_destination_is_exactly_one_of_bone_or_origin() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 4);
        push_i32(&mut bytes, 2);
        push_bone_prefix(&mut bytes, 0x0001);
        bytes.push(1); // destination bone index
        push_bone_prefix(&mut bytes, 0x0000);
        push_f32_n(&mut bytes, &[0.0, 0.5, 0.0]); // destination offset
        close_sections(&mut bytes, 4);
        let model = parse(bytes).unwrap();
        let bones = model.get_all_bone_objects();
        assert_eq!(ModelBoneDestinationU::BONE(1), bones[0].destination);
        assert_eq!(
            ModelBoneDestinationU::ORIGIN(F128([0.0, 0.5, 0.0, 0.0])),
            bones[1].destination
        );
        assert_eq!(-1, bones[0].parent_bone_index);
        assert_eq!([1.0, 0.0, 0.0, 0.0], bones[0].local_x_axis.0);
        assert_eq!([0.0, 0.0, 1.0, 0.0], bones[0].local_z_axis.0);
    }

    #[test]
    fn test_bone_ik_constraint() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 4);
        push_i32(&mut bytes, 1);
        push_bone_prefix(&mut bytes, 0x0001 | 0x0020);
        bytes.push(0xff); // destination
        bytes.push(3); // effector
        push_i32(&mut bytes, 40); // iterations
        push_f32(&mut bytes, 1.0); // angle limit
        push_i32(&mut bytes, 2); // links
        bytes.push(1);
        bytes.push(1); // with angle limit
        push_f32_n(&mut bytes, &[-1.0, -1.0, -1.0]);
        push_f32_n(&mut bytes, &[1.0, 1.0, 1.0]);
        bytes.push(2);
        bytes.push(0); // without angle limit
        close_sections(&mut bytes, 4);
        let model = parse(bytes).unwrap();
        let constraint = model.get_all_bone_objects()[0].constraint.as_ref().unwrap();
        assert_eq!(3, constraint.effector_bone_index);
        assert_eq!(0, constraint.target_bone_index);
        assert_eq!(40, constraint.num_iterations);
        assert_eq!(2, constraint.joints.len());
        assert!(constraint.joints[0].has_angle_limit);
        assert_eq!([-1.0, -1.0, -1.0, 0.0], constraint.joints[0].lower_limit.0);
        assert!(!constraint.joints[1].has_angle_limit);
    }

    #[test]
    fn test_ik_link_limit_byte_must_be_boolean() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 4);
        push_i32(&mut bytes, 1);
        push_bone_prefix(&mut bytes, 0x0001 | 0x0020);
        bytes.push(0xff);
        bytes.push(3);
        push_i32(&mut bytes, 40);
        push_f32(&mut bytes, 1.0);
        push_i32(&mut bytes, 1);
        bytes.push(1);
        bytes.push(2); // bad boolean
        assert_eq!(ParseError::ConstraintCorrupted, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_morph_vertex_payload() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 5);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0); // name
        push_i32(&mut bytes, 0); // name en
        bytes.push(2); // category: eye
        bytes.push(1); // vertex morph
        push_i32(&mut bytes, 1);
        bytes.push(3); // vertex index
        push_f32_n(&mut bytes, &[0.1, 0.2, 0.3]);
        close_sections(&mut bytes, 3);
        let model = parse(bytes).unwrap();
        let morph = &model.get_all_morph_objects()[0];
        assert_eq!(ModelMorphType::Vertex, morph.typ);
        assert_eq!(ModelMorphCategory::Eye, morph.category);
        match &morph.u {
            ModelMorphU::VERTICES(elements) => {
                assert_eq!(1, elements.len());
                assert_eq!(3, elements[0].vertex_index);
                assert_eq!([0.1, 0.2, 0.3, 0.0], elements[0].position.0);
            }
            _ => panic!("expected a vertex payload"),
        }
    }

    #[test]
    fn test_morph_flip_requires_v21() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 5);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(4); // category: other
        bytes.push(9); // flip morph under 2.0
        assert_eq!(ParseError::MorphCorrupted, parse(bytes).unwrap_err());

        let mut bytes = prologue(2.1, 0);
        close_sections(&mut bytes, 5);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(4);
        bytes.push(9);
        push_i32(&mut bytes, 1);
        bytes.push(0); // morph index
        push_f32(&mut bytes, 1.0);
        close_sections(&mut bytes, 4);
        let model = parse(bytes).unwrap();
        assert!(matches!(
            model.get_all_morph_objects()[0].u,
            ModelMorphU::FLIPS(_)
        ));
    }

    #[test]
    fn test_morph_impulse_requires_v21() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 5);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(4);
        bytes.push(10); // impulse morph under 2.0
        assert_eq!(ParseError::MorphCorrupted, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_morph_additional_uv_tags_share_the_uv_payload() {
        let mut bytes = prologue(2.0, 1);
        close_sections(&mut bytes, 5);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(0); // category: base
        bytes.push(4); // first additional uv channel
        push_i32(&mut bytes, 1);
        bytes.push(7);
        push_f32_n(&mut bytes, &[0.5, 0.5, 0.0, 0.0]);
        close_sections(&mut bytes, 3);
        let model = parse(bytes).unwrap();
        let morph = &model.get_all_morph_objects()[0];
        assert_eq!(ModelMorphType::Uva1, morph.typ);
        match &morph.u {
            ModelMorphU::UVS(elements) => assert_eq!(7, elements[0].vertex_index),
            _ => panic!("expected a uv payload"),
        }
    }

    #[test]
    fn test_label_items() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 6);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(1); // special
        push_i32(&mut bytes, 2);
        bytes.push(0); // bone item
        bytes.push(1);
        bytes.push(1); // morph item
        bytes.push(2);
        close_sections(&mut bytes, 2);
        let model = parse(bytes).unwrap();
        let label = &model.get_all_label_objects()[0];
        assert!(label.is_special);
        assert_eq!(
            vec![ModelLabelItem::BONE(1), ModelLabelItem::MORPH(2)],
            label.items
        );
    }

    #[test]
    fn test_label_item_tag_rejected() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 6);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(0);
        push_i32(&mut bytes, 1);
        bytes.push(2); // neither bone nor morph
        bytes.push(0);
        assert_eq!(ParseError::LabelCorrupted, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_rigid_body_shape_tag_rejected() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 7);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(0xff); // bone: none
        bytes.push(0); // group
        push_u16(&mut bytes, 0xffff); // mask
        bytes.push(3); // no such shape
        assert_eq!(ParseError::RigidBodyCorrupted, parse(bytes).unwrap_err());
    }

    fn push_rigid_body(buf: &mut Vec<u8>) {
        push_i32(buf, 0);
        push_i32(buf, 0);
        buf.push(0xff); // bone: none
        buf.push(1); // group
        push_u16(buf, 0xfffe); // mask
        buf.push(2); // capsule
        push_f32_n(buf, &[0.5, 1.0, 0.5]); // size
        push_f32_n(buf, &[0.0, 1.0, 0.0]); // origin
        push_f32_n(buf, &[0.0, 0.0, 0.0]); // orientation
        push_f32(buf, 1.0); // mass
        push_f32(buf, 0.5); // linear damping
        push_f32(buf, 0.5); // angular damping
        push_f32(buf, 0.0); // restitution
        push_f32(buf, 0.5); // friction
        buf.push(1); // simulation to bone
    }

    #[test]
    fn test_rigid_body_and_joint() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 7);
        push_i32(&mut bytes, 1);
        push_rigid_body(&mut bytes);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(0); // 6dof spring
        bytes.push(0); // body a
        bytes.push(0xff); // body b: none
        for _ in 0..8 {
            push_f32_n(&mut bytes, &[0.0, 0.0, 0.0]);
        }
        let model = parse(bytes).unwrap();
        let rigid_body = &model.get_all_rigid_body_objects()[0];
        assert_eq!(-1, rigid_body.bone_index);
        assert_eq!(ModelRigidBodyShapeType::Capsule, rigid_body.shape_type);
        assert_eq!(
            ModelRigidBodyTransformType::FromSimulationToBone,
            rigid_body.transform_type
        );
        let joint = &model.get_all_joint_objects()[0];
        assert_eq!(ModelJointType::Generic6dofSpringConstraint, joint.typ);
        assert_eq!(0, joint.rigid_body_a_index);
        assert_eq!(-1, joint.rigid_body_b_index);
    }

    #[test]
    fn test_joint_type_tag_rejected() {
        let mut bytes = prologue(2.0, 0);
        close_sections(&mut bytes, 8);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(6); // no such joint type
        assert_eq!(ParseError::JointCorrupted, parse(bytes).unwrap_err());
    }

    #[test]
    fn test_soft_body_v21() {
        let mut bytes = prologue(2.1, 0);
        close_sections(&mut bytes, 9);
        push_i32(&mut bytes, 1);
        push_i32(&mut bytes, 0);
        push_i32(&mut bytes, 0);
        bytes.push(1); // rope
        bytes.push(0xff); // material: none
        bytes.push(0); // group
        push_u16(&mut bytes, 0xffff); // mask
        bytes.push(1); // flags
        push_i32(&mut bytes, 2); // bending constraints distance
        push_i32(&mut bytes, 4); // cluster count
        push_f32(&mut bytes, 1.0); // total mass
        push_f32(&mut bytes, 0.05); // margin
        push_i32(&mut bytes, 0); // aero model
        for _ in 0..18 {
            push_f32(&mut bytes, 0.5);
        }
        for _ in 0..4 {
            push_i32(&mut bytes, 4);
        }
        for _ in 0..3 {
            push_f32(&mut bytes, 1.0);
        }
        push_i32(&mut bytes, 1); // anchors
        bytes.push(0);
        bytes.push(2);
        bytes.push(1);
        push_i32(&mut bytes, 2); // pinned vertices
        bytes.push(0);
        bytes.push(1);
        let mut buffer = Buffer::create(bytes);
        let model = Model::load_from_buffer(&mut buffer).unwrap();
        assert!(buffer.is_end());
        let soft_body = &model.get_all_soft_body_objects()[0];
        assert_eq!(ModelSoftBodyShapeType::Rope, soft_body.shape_type);
        assert_eq!(-1, soft_body.material_index);
        assert_eq!(
            ModelSoftBodyAeroModelType::VertexPoint,
            soft_body.aero_model
        );
        assert_eq!(1, soft_body.anchors.len());
        assert_eq!(2, soft_body.anchors[0].vertex_index);
        assert!(soft_body.anchors[0].is_near_enabled);
        assert_eq!(vec![0, 1], soft_body.pinned_vertex_indices);
    }

    #[test]
    fn test_soft_body_section_may_be_absent_in_v21() {
        let mut bytes = prologue(2.1, 0);
        close_sections(&mut bytes, 9);
        let model = parse(bytes).unwrap();
        assert_eq!(ModelFormatType::Pmx2_1, model.get_format_type());
        assert!(model.get_all_soft_body_objects().is_empty());
    }
}
