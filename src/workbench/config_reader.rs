// Saved configurations (INI) and template bundles (JSON).

use std::fs;
use std::path::{Path, PathBuf};

use ini::{EscapePolicy, Ini, ParseOption};
use serde::{Deserialize, Serialize};

use crate::workbench::*;

/// Directory holding the template bundles, next to the configuration file.
pub const BUNDLES_DIR: &str = "template_bundles";

// Windows paths are stored as they are: backslashes are not escapes.
fn parse_options() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        ..ParseOption::default()
    }
}

fn read_copies(value: Option<&str>) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|c| *c > 0)
        .unwrap_or(1)
}

/// The named configurations of an INI file, one section per configuration.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: &Path) -> ConfigStore {
        ConfigStore {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> WorkbenchResult<Ini> {
        if !self.path.exists() {
            debug!("read: {:?} does not exist yet", self.path);
            return Ok(Ini::new());
        }
        Ini::load_from_file_opt(&self.path, parse_options()).context(ReadingConfigSnafu {
            path: self.path.display().to_string(),
        })
    }

    fn write(&self, ini: &Ini) -> WorkbenchResult<()> {
        ini.write_to_file_policy(&self.path, EscapePolicy::Nothing)
            .context(WritingConfigSnafu {
                path: self.path.display().to_string(),
            })
    }

    /// The configuration names, in file order.
    pub fn list(&self) -> WorkbenchResult<Vec<String>> {
        let ini = self.read()?;
        Ok(ini
            .sections()
            .flatten()
            .map(|s| s.to_string())
            .collect())
    }

    pub fn exists(&self, name: &str) -> WorkbenchResult<bool> {
        let ini = self.read()?;
        Ok(ini.section(Some(name.trim())).is_some())
    }

    pub fn load(&self, name: &str) -> WorkbenchResult<ConfigurationBundle> {
        let name = name.trim();
        let ini = self.read()?;
        let section = ini
            .section(Some(name))
            .context(ConfigNotFoundSnafu { name })?;
        let get = |key: &str| section.get(key).unwrap_or("").to_string();

        let count: usize = section
            .get("quest_count")
            .and_then(|c| c.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut questionnaires: Vec<QuestionnaireTemplate> = Vec::new();
        for i in 0..count {
            let mut q = QuestionnaireTemplate::new(
                &get(&format!("quest_{}_name", i)),
                &get(&format!("quest_{}_path", i)),
                read_copies(section.get(&format!("quest_{}_count", i))),
            );
            q.required_fields = get(&format!("quest_{}_required", i))
                .split(',')
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(|f| f.to_string())
                .collect();
            questionnaires.push(q);
        }
        let sheet = get("masterfile_sheet");

        let res = ConfigurationBundle {
            name: name.to_string(),
            target_path: get("target_path"),
            source_path: get("source_path"),
            masterfile_path: get("excel_path"),
            masterfile_sheet: if sheet.trim().is_empty() {
                None
            } else {
                Some(sheet)
            },
            questionnaires,
        };
        debug!("load: {:?}", res);
        info!("Configuration '{}' loaded", name);
        Ok(res)
    }

    /// Saves a configuration under its name. An existing configuration with
    /// the same name is replaced only if `overwrite` is set.
    pub fn save(&self, bundle: &ConfigurationBundle, overwrite: bool) -> WorkbenchResult<()> {
        let name = bundle.name.trim();
        if name.is_empty() {
            return EmptyConfigNameSnafu {}.fail();
        }
        let mut ini = self.read()?;
        if ini.section(Some(name)).is_some() {
            if !overwrite {
                return ConfigExistsSnafu { name }.fail();
            }
            ini.delete(Some(name));
        }
        {
            let mut set = |key: String, value: String| ini.set_to(Some(name), key, value);
            set("target_path".to_string(), bundle.target_path.clone());
            set("quest_count".to_string(), bundle.questionnaires.len().to_string());
            for (i, q) in bundle.questionnaires.iter().enumerate() {
                set(format!("quest_{}_name", i), q.name.clone());
                set(format!("quest_{}_path", i), q.template_path.clone());
                set(format!("quest_{}_count", i), q.copies.to_string());
                if !q.required_fields.is_empty() {
                    set(format!("quest_{}_required", i), q.required_fields.join(","));
                }
            }
            set("source_path".to_string(), bundle.source_path.clone());
            set("excel_path".to_string(), bundle.masterfile_path.clone());
            if let Some(sheet) = &bundle.masterfile_sheet {
                set("masterfile_sheet".to_string(), sheet.clone());
            }
        }
        self.write(&ini)?;
        info!("Configuration '{}' saved to {}", name, self.path.display());
        Ok(())
    }

    pub fn delete(&self, name: &str) -> WorkbenchResult<()> {
        let name = name.trim();
        let mut ini = self.read()?;
        if ini.delete(Some(name)).is_none() {
            return ConfigNotFoundSnafu { name }.fail();
        }
        self.write(&ini)?;
        info!("Configuration '{}' deleted", name);
        Ok(())
    }

    /// The template bundles stored next to this configuration file.
    pub fn bundles(&self) -> BundleStore {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        BundleStore::new(&parent.join(BUNDLES_DIR))
    }
}

// **** Template bundles ****

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    pub index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub template_path: String,
    /// Written as text, accepted as text or number.
    pub copy_count: Option<JSValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<String>,
}

impl BundleEntry {
    fn copies(&self) -> u32 {
        match &self.copy_count {
            Some(JSValue::Number(n)) => n
                .as_u64()
                .filter(|c| *c > 0)
                .map(|c| c as u32)
                .unwrap_or(1),
            Some(JSValue::String(s)) => read_copies(Some(s.as_str())),
            _ => 1,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TemplateBundle {
    pub name: String,
    pub questionnaire_count: usize,
    pub questionnaires: Vec<BundleEntry>,
}

impl TemplateBundle {
    pub fn from_templates(name: &str, templates: &[QuestionnaireTemplate]) -> TemplateBundle {
        TemplateBundle {
            name: name.to_string(),
            questionnaire_count: templates.len(),
            questionnaires: templates
                .iter()
                .enumerate()
                .map(|(index, q)| BundleEntry {
                    index,
                    name: q.name.clone(),
                    template_path: q.template_path.clone(),
                    copy_count: Some(json!(q.copies.to_string())),
                    required_fields: q.required_fields.clone(),
                })
                .collect(),
        }
    }

    /// The questionnaires, placed at their index. Slots without an entry stay
    /// blank and entries beyond the count are ignored.
    pub fn questionnaires(&self) -> WorkbenchResult<Vec<QuestionnaireTemplate>> {
        let mut res: Vec<QuestionnaireTemplate> = (0..self.questionnaire_count)
            .map(|_| QuestionnaireTemplate::new("", "", 1))
            .collect();
        for e in self.questionnaires.iter() {
            match res.get_mut(e.index) {
                Some(slot) => {
                    *slot = QuestionnaireTemplate::new(&e.name, &e.template_path, e.copies());
                    slot.required_fields = e.required_fields.clone();
                }
                None => warn!(
                    "Bundle '{}': ignoring questionnaire {} beyond the count {}",
                    self.name, e.index, self.questionnaire_count
                ),
            }
        }
        if res.iter().all(|q| q.is_blank()) {
            whatever!("Template bundle '{}' has no questionnaire", self.name)
        }
        Ok(res)
    }
}

/// A directory of `<name>.json` template bundles.
pub struct BundleStore {
    dir: PathBuf,
}

impl BundleStore {
    pub fn new(dir: &Path) -> BundleStore {
        BundleStore {
            dir: dir.to_path_buf(),
        }
    }

    // Bundle names stay inside the bundle directory.
    fn file(&self, name: &str) -> WorkbenchResult<PathBuf> {
        let name = name.trim();
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return InvalidBundleNameSnafu { name }.fail();
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    /// The bundle names, sorted. A missing directory has no bundle.
    pub fn list(&self) -> WorkbenchResult<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).context(ReadingFileSnafu {
            path: self.dir.display().to_string(),
        })?;
        let mut res: Vec<String> = Vec::new();
        for entry_r in entries {
            let entry = entry_r.context(ReadingFileSnafu {
                path: self.dir.display().to_string(),
            })?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if let Some(name) = file_name.strip_suffix(".json") {
                res.push(name.to_string());
            }
        }
        res.sort();
        Ok(res)
    }

    pub fn load(&self, name: &str) -> WorkbenchResult<TemplateBundle> {
        let path = self.file(name)?;
        if !path.is_file() {
            return BundleNotFoundSnafu { name: name.trim() }.fail();
        }
        let contents = read_to_string(&path)?;
        let bundle: TemplateBundle = serde_json::from_str(&contents).context(ParsingBundleSnafu {
            path: path.display().to_string(),
        })?;
        debug!("load: bundle: {:?}", bundle);
        Ok(bundle)
    }

    pub fn save(
        &self,
        name: &str,
        templates: &[QuestionnaireTemplate],
        overwrite: bool,
    ) -> WorkbenchResult<PathBuf> {
        let name = name.trim();
        if name.is_empty() {
            return EmptyConfigNameSnafu {}.fail();
        }
        let path = self.file(name)?;
        if path.exists() && !overwrite {
            return BundleExistsSnafu { name }.fail();
        }
        fs::create_dir_all(&self.dir).context(WritingFileSnafu {
            path: self.dir.display().to_string(),
        })?;
        let bundle = TemplateBundle::from_templates(name, templates);
        let contents = serde_json::to_string_pretty(&bundle).context(ParsingBundleSnafu {
            path: path.display().to_string(),
        })?;
        fs::write(&path, contents).context(WritingFileSnafu {
            path: path.display().to_string(),
        })?;
        info!("Template bundle '{}' saved to {}", name, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str) -> ConfigurationBundle {
        let mut nasa = QuestionnaireTemplate::new("NASA", r"C:\templates\nasa.pdf", 3);
        nasa.required_fields = vec!["q1".to_string(), "q2".to_string()];
        ConfigurationBundle {
            name: name.to_string(),
            target_path: r"C:\study\participants".to_string(),
            source_path: "/data/study".to_string(),
            masterfile_path: "/data/master.xlsx".to_string(),
            masterfile_sheet: Some("Results".to_string()),
            questionnaires: vec![
                QuestionnaireTemplate::new("Demo", "/t/demo.pdf", 1),
                nasa,
            ],
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(&dir.path().join("config.ini"));
        assert!(store.list().unwrap().is_empty());
        store.save(&sample("pilot"), false).unwrap();
        store.save(&sample("main"), false).unwrap();
        assert_eq!(store.list().unwrap(), vec!["pilot", "main"]);
        assert_eq!(store.load("pilot").unwrap(), sample("pilot"));
    }

    #[test]
    fn existing_name_needs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(&dir.path().join("config.ini"));
        store.save(&sample("pilot"), false).unwrap();
        let mut other = sample("pilot");
        other.questionnaires.truncate(1);
        assert!(matches!(
            store.save(&other, false),
            Err(WorkbenchError::ConfigExists { .. })
        ));
        store.save(&other, true).unwrap();
        assert_eq!(store.load("pilot").unwrap().questionnaires.len(), 1);
    }

    #[test]
    fn delete_only_the_named_section() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(&dir.path().join("config.ini"));
        store.save(&sample("pilot"), false).unwrap();
        store.save(&sample("main"), false).unwrap();
        store.delete("pilot").unwrap();
        assert_eq!(store.list().unwrap(), vec!["main"]);
        assert!(matches!(
            store.delete("pilot"),
            Err(WorkbenchError::ConfigNotFound { .. })
        ));
        assert!(matches!(
            store.load("pilot"),
            Err(WorkbenchError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn reads_files_with_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.ini");
        fs::write(
            &p,
            "[old]\ntarget_path = D:\\out\nquest_count = 2\nquest_0_name = Demo\nquest_0_count = x\n",
        )
        .unwrap();
        let c = ConfigStore::new(&p).load("old").unwrap();
        assert_eq!(c.target_path, "D:\\out");
        assert_eq!(c.masterfile_path, "");
        assert_eq!(c.masterfile_sheet, None);
        assert_eq!(c.questionnaires.len(), 2);
        assert_eq!(c.questionnaires[0].copies, 1);
        assert!(c.questionnaires[1].is_blank());
    }

    #[test]
    fn empty_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(&dir.path().join("config.ini"));
        assert!(matches!(
            store.save(&sample("  "), false),
            Err(WorkbenchError::EmptyConfigName { .. })
        ));
    }

    #[test]
    fn unwritable_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(&dir.path().join("missing").join("config.ini"));
        assert!(matches!(
            store.save(&sample("pilot"), false),
            Err(WorkbenchError::WritingConfig { .. })
        ));
    }

    #[test]
    fn bundles_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(&dir.path().join("config.ini"));
        let bundles = store.bundles();
        assert!(bundles.list().unwrap().is_empty());

        let templates = sample("x").questionnaires;
        let p = bundles.save("standard", &templates, false).unwrap();
        assert_eq!(p, dir.path().join(BUNDLES_DIR).join("standard.json"));
        assert!(matches!(
            bundles.save("standard", &templates, false),
            Err(WorkbenchError::BundleExists { .. })
        ));
        assert_eq!(bundles.list().unwrap(), vec!["standard"]);
        let loaded = bundles.load("standard").unwrap();
        assert_eq!(loaded.questionnaires().unwrap(), templates);
    }

    #[test]
    fn bundle_copy_count_as_number_or_text() {
        let dir = tempfile::tempdir().unwrap();
        let bundles = BundleStore::new(dir.path());
        fs::write(
            dir.path().join("legacy.json"),
            r#"{"name": "legacy", "questionnaire_count": 3, "questionnaires": [
                {"index": 0, "name": "Demo", "template_path": "demo.pdf", "copy_count": "2"},
                {"index": 1, "name": "NASA", "template_path": "nasa.pdf", "copy_count": 4},
                {"index": 7, "name": "Extra", "template_path": "x.pdf", "copy_count": "1"}
            ]}"#,
        )
        .unwrap();
        let qs = bundles.load("legacy").unwrap().questionnaires().unwrap();
        assert_eq!(qs.len(), 3);
        assert_eq!(qs[0].copies, 2);
        assert_eq!(qs[1].copies, 4);
        assert!(qs[2].is_blank());
        assert!(matches!(
            bundles.load("nope"),
            Err(WorkbenchError::BundleNotFound { .. })
        ));
    }

    #[test]
    fn bundle_names_stay_in_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let bundles = BundleStore::new(&dir.path().join(BUNDLES_DIR));
        let templates = sample("x").questionnaires;
        for name in ["../x", "a/b", r"a\b", ".."] {
            assert!(matches!(
                bundles.save(name, &templates, false),
                Err(WorkbenchError::InvalidBundleName { .. })
            ));
            assert!(matches!(
                bundles.load(name),
                Err(WorkbenchError::InvalidBundleName { .. })
            ));
        }
        assert!(!dir.path().join("x.json").exists());
    }
}
