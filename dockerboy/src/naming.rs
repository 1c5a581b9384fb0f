//! Image and container names derived from a single base name.
//!
//! A base name `demo` at generation `n` maps to the image `demo-image:vn` and
//! the container `demo-container-vn`. Generation zero carries no version at
//! all, so a freshly configured project uses `demo-image` and
//! `demo-container`. Container names cannot contain `:`, which is why the
//! container side uses `-v` instead of a tag.

use crate::{
    error::{Error, Result},
    models::{ContainerName, ImageName},
};

const IMAGE_SUFFIX: &str = "-image";
const CONTAINER_SUFFIX: &str = "-container";

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ResourceName {
    base: String,
    version: Option<u32>,
}

impl ResourceName {
    pub fn new<S: Into<String>>(base: S) -> Result<ResourceName> {
        let base = base.into();
        validate_base(&base)?;

        Ok(ResourceName {
            base,
            version: None,
        })
    }

    /// The same base at an explicit generation. `None` is generation zero.
    pub fn at_version(self, version: Option<u32>) -> ResourceName {
        ResourceName { version, ..self }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn image_name(&self) -> ImageName {
        match self.version {
            Some(version) => ImageName(format!("{}{}:v{}", self.base, IMAGE_SUFFIX, version)),
            None => ImageName(format!("{}{}", self.base, IMAGE_SUFFIX)),
        }
    }

    pub fn container_name(&self) -> ContainerName {
        match self.version {
            Some(version) => {
                ContainerName(format!("{}{}-v{}", self.base, CONTAINER_SUFFIX, version))
            }
            None => ContainerName(format!("{}{}", self.base, CONTAINER_SUFFIX)),
        }
    }

    /// The name a rebuild commits to. An unversioned name counts as
    /// generation zero, so its first rebuild lands on `v1`.
    pub fn next(&self) -> ResourceName {
        ResourceName {
            base: self.base.clone(),
            version: Some(self.version.map_or(1, |version| version + 1)),
        }
    }

    pub fn from_image_name(name: &str) -> Result<ResourceName> {
        let (repository, version) = match name.rfind(':') {
            Some(index) => {
                let version = parse_version(&name[index + 1..]).ok_or_else(|| {
                    Error::MalformedVersion {
                        name: name.to_owned(),
                    }
                })?;
                (&name[..index], Some(version))
            }
            None => (name, None),
        };

        let base = strip_suffix(repository, IMAGE_SUFFIX)?;
        Ok(ResourceName::new(base)?.at_version(version))
    }

    pub fn from_container_name(name: &str) -> Result<ResourceName> {
        let (stem, version) = match name.rfind("-v") {
            Some(index) => match parse_version(&name[index + 1..]) {
                Some(version) if name[..index].ends_with(CONTAINER_SUFFIX) => {
                    (&name[..index], Some(version))
                }
                _ => (name, None),
            },
            None => (name, None),
        };

        let base = strip_suffix(stem, CONTAINER_SUFFIX)?;
        Ok(ResourceName::new(base)?.at_version(version))
    }
}

/// Container name paired with an image name. Only the trailing `-image`
/// marker is rewritten, a `image` elsewhere in the name is left alone.
pub fn image_to_container_name(image: &ImageName) -> Result<ContainerName> {
    Ok(ResourceName::from_image_name(&image.0)?.container_name())
}

pub fn container_to_image_name(container: &ContainerName) -> Result<ImageName> {
    Ok(ResourceName::from_container_name(&container.0)?.image_name())
}

/// Bumps the `:vN` suffix of `name`. Names without a parsable suffix are
/// rejected rather than treated as `v0`.
pub fn next_version(name: &str) -> Result<String> {
    let malformed = || Error::MalformedVersion {
        name: name.to_owned(),
    };

    let index = name.rfind(':').ok_or_else(malformed)?;
    let (base, tag) = (&name[..index], &name[index + 1..]);
    let version = parse_version(tag).ok_or_else(malformed)?;

    if base.is_empty() {
        return Err(malformed());
    }

    Ok(format!("{}:v{}", base, version + 1))
}

fn parse_version(tag: &str) -> Option<u32> {
    let digits = tag.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok()
}

fn strip_suffix<'a>(name: &'a str, suffix: &str) -> Result<&'a str> {
    name.strip_suffix(suffix)
        .ok_or_else(|| Error::Config(format!("{:?} does not end with {:?}", name, suffix)))
}

fn validate_base(base: &str) -> Result<()> {
    if base.is_empty() {
        return Err(Error::Config("the name must not be empty".into()));
    }

    if !is_path_component(base) {
        return Err(Error::Config(format!(
            "{:?} is not a valid name, use runs of lowercase letters and digits joined by \
             `.`, `_`, `__` or dashes",
            base
        )));
    }

    if base.ends_with(IMAGE_SUFFIX) || base.ends_with(CONTAINER_SUFFIX) {
        return Err(Error::Config(format!(
            "{:?} must not end with {:?} or {:?}, those suffixes are added automatically",
            base, IMAGE_SUFFIX, CONTAINER_SUFFIX
        )));
    }

    Ok(())
}

/// Docker's rule for a repository path component: lowercase alphanumeric
/// runs separated by `.`, `_`, `__` or one or more `-`.
fn is_path_component(name: &str) -> bool {
    let mut separator = String::new();
    let mut seen_run = false;

    for c in name.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if !separator.is_empty() {
                if !is_separator(&separator) {
                    return false;
                }
                separator.clear();
            }
            seen_run = true;
        } else if matches!(c, '.' | '_' | '-') && seen_run {
            separator.push(c);
        } else {
            return false;
        }
    }

    seen_run && separator.is_empty()
}

fn is_separator(separator: &str) -> bool {
    matches!(separator, "." | "_" | "__") || separator.bytes().all(|b| b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_version_increments_the_tag() {
        assert_eq!(next_version("foo:v3").unwrap(), "foo:v4");
        assert_eq!(next_version("demo-image:v9").unwrap(), "demo-image:v10");
    }

    #[test]
    fn next_version_rejects_missing_or_bad_tags() {
        for name in &["foo", "foo:", "foo:3", "foo:vx", "foo:v", ":v1", "foo:v-1"] {
            match next_version(name) {
                Err(Error::MalformedVersion { name: reported }) => assert_eq!(reported, *name),
                other => panic!("{:?} gave {:?}", name, other),
            }
        }
    }

    #[test]
    fn names_derive_from_the_base() {
        let name = ResourceName::new("demo").unwrap();
        assert_eq!(name.image_name().0, "demo-image");
        assert_eq!(name.container_name().0, "demo-container");

        let next = name.next();
        assert_eq!(next.image_name().0, "demo-image:v1");
        assert_eq!(next.container_name().0, "demo-container-v1");
        assert_eq!(next.next().image_name().0, "demo-image:v2");
    }

    #[test]
    fn image_token_inside_the_base_is_not_rewritten() {
        let image = ImageName("imagenet-image:v2".into());
        assert_eq!(
            image_to_container_name(&image).unwrap().0,
            "imagenet-container-v2"
        );

        let container = ContainerName("imagenet-container".into());
        assert_eq!(container_to_image_name(&container).unwrap().0, "imagenet-image");
    }

    #[test]
    fn names_without_a_suffix_are_rejected() {
        assert!(ResourceName::from_image_name("demo").is_err());
        assert!(ResourceName::from_container_name("demo-image").is_err());
        assert!(matches!(
            ResourceName::from_image_name("demo-image:latest"),
            Err(Error::MalformedVersion { .. })
        ));
    }

    #[test]
    fn base_names_are_validated() {
        assert!(ResourceName::new("").is_err());
        assert!(ResourceName::new("Demo").is_err());
        assert!(ResourceName::new("demo:v1").is_err());
        assert!(ResourceName::new("demo-image").is_err());
        assert!(ResourceName::new("my_project.2").is_ok());
    }

    #[test]
    fn base_names_follow_docker_separators() {
        for name in &["a__b", "a---b", "my-project", "x.1_y", "2demo"] {
            assert!(ResourceName::new(*name).is_ok(), "{:?}", name);
        }

        for name in &["demo.", "demo_", "demo-", "a..b", "a___b", "a._b", ".demo", "-demo"] {
            assert!(
                matches!(ResourceName::new(*name), Err(Error::Config(_))),
                "{:?}",
                name
            );
        }
    }
}
