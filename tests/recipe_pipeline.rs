use std::collections::BTreeMap;

use skiff_models::Recipe;
use skiff_packaging::{image_ref_for, render, ContextStager, BUILD_FILE_NAME};

const BOT_RECIPE: &str = r#"
name = "bot"

[image]
base = "python:3.11.3"
workdir = "/app"

[[copy]]
source = "."
dest = "."

[network]
expose = [8080]

[env]
NAME = "Bot"

[process]
command = ["python", "main.py"]
"#;

fn bot_recipe() -> Recipe {
    let recipe: Recipe = toml::from_str(BOT_RECIPE).unwrap();
    recipe.validate().unwrap();
    recipe
}

fn bot_context() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("main.py"),
        "import os\nprint(os.environ.get(\"NAME\"))\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("requirements.txt"), "").unwrap();
    dir
}

#[test]
fn recipe_renders_the_expected_build_file() {
    let rendered = render(&bot_recipe()).unwrap();
    assert_eq!(
        rendered,
        "FROM python:3.11.3\n\
         WORKDIR /app\n\
         COPY . .\n\
         EXPOSE 8080\n\
         ENV NAME=Bot\n\
         CMD [\"python\", \"main.py\"]\n"
    );
}

#[test]
fn staging_carries_the_whole_context_and_the_build_file() {
    let recipe = bot_recipe();
    let context = bot_context();

    let staged = ContextStager::new(64 * 1024)
        .stage(context.path(), &recipe)
        .unwrap();

    for name in ["main.py", "requirements.txt", BUILD_FILE_NAME] {
        assert!(staged.path().join(name).is_file(), "missing {name}");
    }
    assert_eq!(
        std::fs::read(staged.path().join("main.py")).unwrap(),
        std::fs::read(context.path().join("main.py")).unwrap(),
    );
    assert_eq!(
        std::fs::read_to_string(staged.build_file()).unwrap(),
        render(&recipe).unwrap()
    );
}

#[test]
fn derived_image_refs_are_reproducible() {
    let recipe = bot_recipe();
    let context = bot_context();
    let stager = ContextStager::new(64 * 1024);

    let first = stager.stage(context.path(), &recipe).unwrap();
    let second = stager.stage(context.path(), &recipe).unwrap();

    let first_ref = image_ref_for(&recipe, &first.digest);
    assert_eq!(first_ref, image_ref_for(&recipe, &second.digest));
    assert!(first_ref.starts_with("skiff/bot:"));

    std::fs::write(context.path().join("main.py"), "print('v2')\n").unwrap();
    let third = stager.stage(context.path(), &recipe).unwrap();
    assert_ne!(first_ref, image_ref_for(&recipe, &third.digest));
}

#[test]
fn overrides_take_precedence_in_the_merged_environment() {
    let recipe = bot_recipe();

    let merged = recipe.merged_env(&BTreeMap::new());
    assert_eq!(merged.get("NAME").map(String::as_str), Some("Bot"));

    let overrides = BTreeMap::from([("NAME".to_string(), "Other".to_string())]);
    let merged = recipe.merged_env(&overrides);
    assert_eq!(merged.get("NAME").map(String::as_str), Some("Other"));
}
