//! Built-in prompt templates.
//!
//! Placeholders use `{name}`; literal braces are written `{{` and `}}`.
//! `{package}` is filled by the registry, everything else by bindings.

/// Zero-shot test generation.
/// Placeholders: {package}, {module_name}, {function_name}, {code}
pub const ZERO_SHOT_TEMPLATE: &str = r####"You are an expert Python developer writing pytest unit tests.

Write unit tests for the function `{function_name}` defined in module `{module_name}`:

```python
{code}
```

Rules:
- The first line of the file MUST be exactly: from {package}.{module_name} import {function_name}
- Do NOT redefine or copy `{function_name}`; import it.
- Write 4 to 6 test functions, each named with a `test_` prefix.
- Every test function contains at least one `assert`.
- Output only Python code. No explanations, no markdown.
"####;

/// Few-shot test generation with a worked example.
/// Placeholders: {package}, {module_name}, {function_name}, {code}
pub const FEW_SHOT_TEMPLATE: &str = r####"You are an expert Python developer writing pytest unit tests.

Here is an example.

Function under test (module `string_tools`):

```python
def is_palindrome(text):
    cleaned = "".join(ch.lower() for ch in text if ch.isalnum())
    return cleaned == cleaned[::-1]
```

Tests:

```python
from {package}.string_tools import is_palindrome


def test_is_palindrome_simple_word():
    assert is_palindrome("level") is True


def test_is_palindrome_ignores_case_and_spaces():
    assert is_palindrome("Never odd or even") is True


def test_is_palindrome_rejects_non_palindrome():
    assert is_palindrome("python") is False


def test_is_palindrome_empty_string():
    assert is_palindrome("") is True
```

Now write tests for the function `{function_name}` in module `{module_name}`:

```python
{code}
```

Rules:
- The first line of the file MUST be exactly: from {package}.{module_name} import {function_name}
- Do NOT redefine or copy `{function_name}`; import it.
- Write 4 to 6 test functions, each named with a `test_` prefix.
- Every test function contains at least one `assert`.
- Output only Python code. No explanations, no markdown.
"####;

/// Structured test generation: the model is walked through a fixed plan.
/// Placeholders: {package}, {module_name}, {function_name}, {code}
pub const STRUCTURED_TEMPLATE: &str = r####"You are an expert Python developer writing pytest unit tests.

## Function Under Test

Module: `{module_name}`
Function: `{function_name}`

```python
{code}
```

## Plan

1. Identify the normal inputs and the expected result for each.
2. Identify boundary inputs (empty values, zero, negative numbers, single elements).
3. Identify inputs that should raise, if the function raises.
4. Write one test function per case.

## Output Requirements

- The first line of the file MUST be exactly: from {package}.{module_name} import {function_name}
- Do NOT redefine or copy `{function_name}`; import it.
- Write 4 to 6 test functions, each named with a `test_` prefix.
- Every test function contains at least one `assert`.
- Output only Python code. No explanations, no markdown.
"####;

/// Repair of a failing test file using pytest output.
/// Placeholders: {package}, {module_name}, {function_name}, {code},
/// {previous_test}, {failing_tests}, {pytest_log}
pub const AUTO_REPAIR_TEMPLATE: &str = r####"You are an expert Python developer fixing a failing pytest test file.

## Function Under Test

Module: `{module_name}`
Function: `{function_name}`

```python
{code}
```

## Previous Test File

```python
{previous_test}
```

## Failing Tests

```python
{failing_tests}
```

## Pytest Output

```
{pytest_log}
```

## Your Task

Rewrite the ENTIRE test file so that every test passes against the function above.
Fix wrong expected values by reasoning about what the function actually returns.
Remove tests that cannot be made correct and replace them with correct ones.

Rules:
- The first line of the file MUST be exactly: from {package}.{module_name} import {function_name}
- Do NOT redefine or copy `{function_name}`; import it.
- Write 4 to 6 test functions, each named with a `test_` prefix.
- Every test function contains at least one `assert`.
- Output only Python code. No explanations, no markdown.
"####;
