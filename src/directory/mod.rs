//! Immutable-after-startup index of users and personas.
//!
//! Built once from the seed section of the configuration file. Lookups are
//! plain `HashMap` reads; nothing here is mutated after startup except a
//! persona's texture slots and skin model, which carry their own locks.

use crate::store::texture::Texture;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock, Weak};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Steve,
    Alex,
}

impl ModelKind {
    /// Wire name used in the skin texture metadata.
    #[must_use]
    pub fn model_name(self) -> &'static str {
        match self {
            Self::Steve => "default",
            Self::Alex => "slim",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureKind {
    Skin,
    Cape,
    Elytra,
}

impl TextureKind {
    pub fn from_path_segment(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skin" => Some(Self::Skin),
            "cape" => Some(Self::Cape),
            "elytra" => Some(Self::Elytra),
            _ => None,
        }
    }

    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Skin => "SKIN",
            Self::Cape => "CAPE",
            Self::Elytra => "ELYTRA",
        }
    }
}

/// A named, ownable profile with texture slots.
///
/// The owner back-reference is set exactly once while the directory is
/// built; a second bind attempt is a seed-data error.
#[derive(Debug)]
pub struct Persona {
    id: Uuid,
    name: String,
    model: RwLock<ModelKind>,
    textures: RwLock<BTreeMap<TextureKind, Arc<Texture>>>,
    uploadable: Vec<TextureKind>,
    owner: OnceLock<Weak<User>>,
}

impl Persona {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn model(&self) -> ModelKind {
        *self
            .model
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_model(&self, model: ModelKind) {
        *self
            .model
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = model;
    }

    #[must_use]
    pub fn textures(&self) -> BTreeMap<TextureKind, Arc<Texture>> {
        self.textures
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn set_texture(&self, kind: TextureKind, texture: Arc<Texture>) {
        self.textures
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(kind, texture);
    }

    pub fn remove_texture(&self, kind: TextureKind) {
        self.textures
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&kind);
    }

    #[must_use]
    pub fn can_upload(&self, kind: TextureKind) -> bool {
        self.uploadable.contains(&kind)
    }

    /// Owning user; `None` only if the owner was dropped, which cannot
    /// happen while the directory is alive.
    #[must_use]
    pub fn owner(&self) -> Option<Arc<User>> {
        self.owner.get().and_then(Weak::upgrade)
    }

    fn bind_owner(&self, owner: Weak<User>) -> Result<()> {
        if self.owner.set(owner).is_err() {
            bail!("owner has already been set");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct User {
    id: Uuid,
    email: String,
    password: String,
    personas: Vec<Arc<Persona>>,
}

impl User {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Plaintext comparison: this service is a test double and stores the
    /// seed password as-is.
    #[must_use]
    pub fn password_matches(&self, candidate: &str) -> bool {
        self.password == candidate
    }

    #[must_use]
    pub fn personas(&self) -> &[Arc<Persona>] {
        &self.personas
    }

    #[must_use]
    pub fn owns(&self, persona: &Arc<Persona>) -> bool {
        self.personas.iter().any(|p| Arc::ptr_eq(p, persona))
    }
}

/// Seed record for a user, as found in the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SeedUser {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub characters: Vec<SeedPersona>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SeedPersona {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: Option<String>,
    #[serde(default)]
    pub model: ModelKind,
    /// Texture slot -> local PNG path, loaded through the texture store at
    /// startup.
    #[serde(default)]
    pub textures: BTreeMap<TextureKind, String>,
    #[serde(default)]
    pub uploadable_textures: Option<Vec<TextureKind>>,
}

const DEFAULT_UPLOADABLE: &[TextureKind] = &[TextureKind::Skin, TextureKind::Cape];

#[derive(Debug)]
pub struct Directory {
    users: Vec<Arc<User>>,
    by_id: HashMap<Uuid, Arc<User>>,
    by_email: HashMap<String, Arc<User>>,
    persona_by_id: HashMap<Uuid, Arc<Persona>>,
    persona_by_name: HashMap<String, Arc<Persona>>,
}

impl Directory {
    /// Build the index from seed data, rejecting incomplete records and
    /// duplicate identities (ids, emails, and persona names are unique
    /// across the whole directory).
    pub fn build(seeds: &[SeedUser]) -> Result<Self> {
        let mut directory = Self {
            users: Vec::new(),
            by_id: HashMap::new(),
            by_email: HashMap::new(),
            persona_by_id: HashMap::new(),
            persona_by_name: HashMap::new(),
        };

        for seed in seeds {
            directory.add_user(seed).with_context(|| {
                format!(
                    "error while processing user {}",
                    seed.email.as_deref().unwrap_or("<missing email>")
                )
            })?;
        }

        Ok(directory)
    }

    fn add_user(&mut self, seed: &SeedUser) -> Result<()> {
        let Some(email) = seed.email.clone() else {
            bail!("email is missing");
        };
        let password = match &seed.password {
            Some(p) if !p.is_empty() => p.clone(),
            _ => bail!("password is missing"),
        };

        let mut personas = Vec::with_capacity(seed.characters.len());
        for character in &seed.characters {
            let persona = build_persona(character).with_context(|| {
                format!(
                    "error while processing character {}",
                    character.name.as_deref().unwrap_or("<missing name>")
                )
            })?;
            personas.push(persona);
        }

        let user = Arc::new_cyclic(|weak: &Weak<User>| {
            for persona in &personas {
                // Cannot fail: each persona was freshly built above.
                let _ = persona.bind_owner(weak.clone());
            }
            User {
                id: seed.id.unwrap_or_else(Uuid::new_v4),
                email,
                password,
                personas: personas.clone(),
            }
        });

        if self.by_id.insert(user.id, Arc::clone(&user)).is_some() {
            bail!("id conflict");
        }
        if self
            .by_email
            .insert(user.email.clone(), Arc::clone(&user))
            .is_some()
        {
            bail!("email conflict");
        }
        for persona in &user.personas {
            if self
                .persona_by_id
                .insert(persona.id, Arc::clone(persona))
                .is_some()
            {
                bail!("uuid conflict for character {}", persona.name);
            }
            if self
                .persona_by_name
                .insert(persona.name.clone(), Arc::clone(persona))
                .is_some()
            {
                bail!("name conflict for character {}", persona.name);
            }
        }

        self.users.push(user);
        Ok(())
    }

    #[must_use]
    pub fn users(&self) -> &[Arc<User>] {
        &self.users
    }

    #[must_use]
    pub fn find_user_by_id(&self, id: Uuid) -> Option<Arc<User>> {
        self.by_id.get(&id).cloned()
    }

    #[must_use]
    pub fn find_user_by_email(&self, email: &str) -> Option<Arc<User>> {
        self.by_email.get(email).cloned()
    }

    #[must_use]
    pub fn find_persona_by_id(&self, id: Uuid) -> Option<Arc<Persona>> {
        self.persona_by_id.get(&id).cloned()
    }

    #[must_use]
    pub fn find_persona_by_name(&self, name: &str) -> Option<Arc<Persona>> {
        self.persona_by_name.get(name).cloned()
    }
}

fn build_persona(seed: &SeedPersona) -> Result<Arc<Persona>> {
    let Some(name) = seed.name.clone() else {
        bail!("name is missing");
    };
    Ok(Arc::new(Persona {
        id: seed.id.unwrap_or_else(Uuid::new_v4),
        name,
        model: RwLock::new(seed.model),
        textures: RwLock::new(BTreeMap::new()),
        uploadable: seed
            .uploadable_textures
            .clone()
            .unwrap_or_else(|| DEFAULT_UPLOADABLE.to_vec()),
        owner: OnceLock::new(),
    }))
}
